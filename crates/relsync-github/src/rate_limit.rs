//! GitHub API budget tracking.
//!
//! Every response carries `X-RateLimit-Remaining` / `X-RateLimit-Reset`; the
//! latest values are kept here so a refused request can be told apart from an
//! authorization failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RateLimitState {
    remaining: Arc<AtomicU64>,
    /// Unix seconds.
    reset_at: Arc<AtomicU64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            remaining: Arc::new(AtomicU64::new(u64::MAX)),
            reset_at: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Relaxed)
    }

    pub fn reset_at(&self) -> u64 {
        self.reset_at.load(Ordering::Relaxed)
    }

    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        if let Some(r) = read("X-RateLimit-Remaining") {
            self.remaining.store(r, Ordering::Relaxed);
        }
        if let Some(r) = read("X-RateLimit-Reset") {
            self.reset_at.store(r, Ordering::Relaxed);
        }
        debug!(remaining = self.remaining(), reset_at = self.reset_at(), "rate limit");
    }

    /// True when `status` is GitHub refusing a request for lack of budget.
    pub fn is_exhausted(&self, status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        ) && self.remaining() == 0
    }

    /// Seconds until the window resets, 0 if it already has.
    pub fn retry_after_secs(&self) -> u64 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.reset_at().saturating_sub(now)
    }
}
