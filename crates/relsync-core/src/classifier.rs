//! Lifecycle classification of a release from its dates.
//!
//! The state is a pure function of `(code_freeze_date, release_date,
//! is_complete, now)`. `ERROR` is never produced here; it is an overlay the
//! orchestrator sets when a sync fails.

use crate::error::{RelsyncError, Result};
use crate::types::ReleaseState;
use chrono::{DateTime, Utc};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Number of days from `now` until `target`, rounded up.
///
/// Anything later today counts as one day away; anything earlier today
/// (down to one full day ago) counts as zero.
pub fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff_ms = (target - now).num_milliseconds();
    -(-diff_ms).div_euclid(DAY_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub state: ReleaseState,
    pub days_until_code_freeze: i64,
    pub days_until_release: i64,
}

impl Classification {
    /// True once the code-freeze instant is no longer in the future.
    pub fn code_freeze_passed(&self) -> bool {
        self.days_until_code_freeze <= 0
    }
}

pub fn classify(
    code_freeze_date: DateTime<Utc>,
    release_date: DateTime<Utc>,
    is_complete: bool,
    now: DateTime<Utc>,
) -> Result<Classification> {
    let cf = days_until(code_freeze_date, now);
    let rd = days_until(release_date, now);

    let state = if cf > 2 {
        ReleaseState::Scheduled
    } else if rd > 0 {
        ReleaseState::CodeFreeze
    } else if rd == 0 && cf < 0 {
        ReleaseState::ReleaseDay
    } else if rd < 0 {
        if is_complete {
            ReleaseState::Released
        } else {
            ReleaseState::Delayed
        }
    } else {
        return Err(RelsyncError::IndeterminateState {
            days_until_code_freeze: cf,
            days_until_release: rd,
        });
    };

    Ok(Classification {
        state,
        days_until_code_freeze: cf,
        days_until_release: rd,
    })
}

/// Convenience wrapper returning only the state.
pub fn classify_state(
    code_freeze_date: DateTime<Utc>,
    release_date: DateTime<Utc>,
    is_complete: bool,
    now: DateTime<Utc>,
) -> Result<ReleaseState> {
    classify(code_freeze_date, release_date, is_complete, now).map(|c| c.state)
}
