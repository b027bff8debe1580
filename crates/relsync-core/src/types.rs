use crate::error::RelsyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ReleaseState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    Scheduled,
    CodeFreeze,
    ReleaseDay,
    Released,
    Delayed,
    /// Overlay set by a failed sync; cleared by the next successful one.
    Error,
}

impl ReleaseState {
    pub fn all() -> &'static [ReleaseState] {
        &[
            ReleaseState::Scheduled,
            ReleaseState::CodeFreeze,
            ReleaseState::ReleaseDay,
            ReleaseState::Released,
            ReleaseState::Delayed,
            ReleaseState::Error,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseState::Scheduled => "SCHEDULED",
            ReleaseState::CodeFreeze => "CODE_FREEZE",
            ReleaseState::ReleaseDay => "RELEASE_DAY",
            ReleaseState::Released => "RELEASED",
            ReleaseState::Delayed => "DELAYED",
            ReleaseState::Error => "ERROR",
        }
    }

    /// Whether a sync in this state mirrors facts from the source host.
    pub fn needs_host_data(self) -> bool {
        match self {
            ReleaseState::Scheduled => false,
            ReleaseState::CodeFreeze
            | ReleaseState::ReleaseDay
            | ReleaseState::Released
            | ReleaseState::Delayed
            | ReleaseState::Error => true,
        }
    }
}

impl fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseState {
    type Err = RelsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReleaseState::all()
            .iter()
            .copied()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RelsyncError::Config(format!("unknown release state: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub link: Option<String>,
    pub job_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: String,
    pub name: String,
    pub operator: String,
    pub code_freeze_date: DateTime<Utc>,
    pub release_date: DateTime<Utc>,
    pub branch_name: String,
    pub branch_link: String,
    pub state: ReleaseState,
    pub is_complete: bool,
    #[serde(default)]
    pub build_artifact: BuildArtifact,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    /// A freshly scheduled release with empty derived fields.
    pub fn new(
        name: impl Into<String>,
        operator: impl Into<String>,
        code_freeze_date: DateTime<Utc>,
        release_date: DateTime<Utc>,
        branch_name: impl Into<String>,
        branch_link: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            operator: operator.into(),
            code_freeze_date,
            release_date,
            branch_name: branch_name.into(),
            branch_link: branch_link.into(),
            state: ReleaseState::Scheduled,
            is_complete: false,
            build_artifact: BuildArtifact::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The `<number>` of an `M<number>` release name.
    pub fn number(&self) -> Option<u64> {
        release_number(&self.name)
    }
}

/// Extract the numeric part of an `M<digits>[suffix]` name.
pub fn release_number(name: &str) -> Option<u64> {
    let digits: String = name
        .strip_prefix('M')?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Partial update of a release. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePatch {
    pub name: Option<String>,
    pub operator: Option<String>,
    pub code_freeze_date: Option<DateTime<Utc>>,
    pub release_date: Option<DateTime<Utc>>,
    pub is_complete: Option<bool>,
    pub branch_name: Option<String>,
    pub branch_link: Option<String>,
    pub state: Option<ReleaseState>,
    pub build_artifact: Option<BuildArtifact>,
}

impl ReleasePatch {
    pub fn sync_result(state: ReleaseState, build_artifact: Option<BuildArtifact>) -> Self {
        Self {
            state: Some(state),
            build_artifact,
            ..Default::default()
        }
    }

    pub fn state_only(state: ReleaseState) -> Self {
        Self::sync_result(state, None)
    }

    pub fn apply(&self, release: &mut Release) {
        if let Some(v) = &self.name {
            release.name = v.clone();
        }
        if let Some(v) = &self.operator {
            release.operator = v.clone();
        }
        if let Some(v) = self.code_freeze_date {
            release.code_freeze_date = v;
        }
        if let Some(v) = self.release_date {
            release.release_date = v;
        }
        if let Some(v) = self.is_complete {
            release.is_complete = v;
        }
        if let Some(v) = &self.branch_name {
            release.branch_name = v.clone();
        }
        if let Some(v) = &self.branch_link {
            release.branch_link = v.clone();
        }
        if let Some(v) = self.state {
            release.state = v;
        }
        if let Some(v) = &self.build_artifact {
            release.build_artifact = v.clone();
        }
        release.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub id: String,
    #[serde(rename = "releaseID")]
    pub release_id: String,
    pub library_name: String,
    pub updated_version: String,
    pub opted_in: bool,
    pub opted_out: bool,
    pub library_group_release: bool,
}

/// Deterministic row id for a library at a given version.
///
/// Re-syncing without a version bump yields the same id, so the row
/// is overwritten in place rather than replaced.
pub fn library_id(library_name: &str, updated_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(library_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(updated_version.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: String,
    #[serde(rename = "releaseID")]
    pub release_id: String,
    #[serde(rename = "libraryID")]
    pub library_id: String,
    #[serde(rename = "commitID")]
    pub commit_id: String,
    pub commit_link: Option<String>,
    #[serde(rename = "pullRequestID")]
    pub pull_request_id: Option<String>,
    pub pull_request_link: Option<String>,
    pub author: String,
    pub commit_title: String,
    pub message: String,
}

/// First non-empty line of a commit message.
pub fn commit_title(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

// ---------------------------------------------------------------------------
// CheckRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRun {
    /// Host-assigned id, also the row key.
    pub id: u64,
    #[serde(rename = "releaseID")]
    pub release_id: String,
    pub name: String,
    #[serde(rename = "headSHA")]
    pub head_sha: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub output_title: Option<String>,
    pub https_url: Option<String>,
}

// ---------------------------------------------------------------------------
// ReleaseError
// ---------------------------------------------------------------------------

/// Append-only record of a failed sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseError {
    pub id: Uuid,
    #[serde(rename = "releaseID")]
    pub release_id: String,
    pub message: String,
    pub stack_trace: String,
    pub context_msg: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Denormalized views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryView {
    #[serde(flatten)]
    pub library: Library,
    pub changes: Vec<Change>,
}

/// A release as the dashboard reads it: libraries with nested changes, plus checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseView {
    #[serde(flatten)]
    pub release: Release,
    pub libraries: Vec<LibraryView>,
    pub checks: Vec<CheckRun>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_number_parses_prefix_digits() {
        assert_eq!(release_number("M130"), Some(130));
        assert_eq!(release_number("M131-hotfix"), Some(131));
        assert_eq!(release_number("X130"), None);
        assert_eq!(release_number("M"), None);
    }

    #[test]
    fn library_id_is_stable_and_version_sensitive() {
        let a = library_id("firebase-common", "20.1.0");
        assert_eq!(a, library_id("firebase-common", "20.1.0"));
        assert_ne!(a, library_id("firebase-common", "20.1.1"));
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn commit_title_skips_blank_leading_lines() {
        assert_eq!(commit_title("\n  Fix crash\n\nbody"), "Fix crash");
        assert_eq!(commit_title(""), "");
    }

    #[test]
    fn state_round_trips_through_str() {
        for st in ReleaseState::all() {
            assert_eq!(st.as_str().parse::<ReleaseState>().unwrap(), *st);
        }
        assert!("LAUNCHED".parse::<ReleaseState>().is_err());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let now = Utc::now();
        let mut r = Release::new("M1", "ops", now, now, "releases/M1", "");
        let patch = ReleasePatch {
            operator: Some("alice".into()),
            state: Some(ReleaseState::CodeFreeze),
            ..Default::default()
        };
        patch.apply(&mut r);
        assert_eq!(r.operator, "alice");
        assert_eq!(r.name, "M1");
        assert_eq!(r.state, ReleaseState::CodeFreeze);
    }

    #[test]
    fn release_view_flattens_release_fields() {
        let now = Utc::now();
        let view = ReleaseView {
            release: Release::new("M2", "ops", now, now, "releases/M2", ""),
            libraries: vec![],
            checks: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["name"], "M2");
        assert_eq!(json["state"], "SCHEDULED");
        assert!(json["libraries"].is_array());
    }
}
