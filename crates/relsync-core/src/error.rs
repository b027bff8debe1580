use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationIssue
// ---------------------------------------------------------------------------

/// What kind of validation rule a request broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    InvalidName,
    InvalidDate,
    CodeFreezeNotBeforeRelease,
    NonMonotonicNumbering,
    DuplicateName,
}

/// Prints the serde name, so messages and JSON bodies agree.
impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => Err(fmt::Error),
        }
    }
}

/// One `{kind, offendingEntity}` pair reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub offending_entity: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, offending_entity: impl Into<String>) -> Self {
        Self {
            kind,
            offending_entity: offending_entity.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Coarse taxonomy used by the orchestrator and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    HostIntegration,
    DataIntegrity,
    NotFound,
    Conflict,
    Internal,
}

// ---------------------------------------------------------------------------
// RelsyncError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RelsyncError {
    #[error("release not found: {0}")]
    ReleaseNotFound(String),

    #[error("release already exists: {0}")]
    ReleaseExists(String),

    #[error("release name '{0}' resolves to more than one release")]
    DuplicateReleaseName(String),

    #[error("indeterminate release state: {days_until_code_freeze} day(s) until code freeze, {days_until_release} day(s) until release")]
    IndeterminateState {
        days_until_code_freeze: i64,
        days_until_release: i64,
    },

    #[error("no version assignment found in version descriptor")]
    VersionNotFound,

    #[error("malformed release manifest: {0}")]
    MalformedManifest(String),

    #[error("malformed change report: {0}")]
    MalformedChangeReport(String),

    #[error("release branch '{0}' does not exist")]
    BranchMissing(String),

    #[error("no '{workflow}' workflow run found on branch '{branch}'")]
    WorkflowNotFound { workflow: String, branch: String },

    #[error("change references unknown library '{0}'")]
    UnknownLibrary(String),

    #[error("validation failed: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("a sync of release {0} is already in progress")]
    SyncInProgress(String),

    #[error("source host returned {status}: {message}")]
    Host { status: u16, message: String },

    #[error("source host rate limit exhausted, resets at {reset_at}")]
    RateLimited { reset_at: u64 },

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{} ({})", i.kind, i.offending_entity))
        .collect::<Vec<_>>()
        .join(", ")
}

impl RelsyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelsyncError::Validation(_) => ErrorKind::Validation,
            RelsyncError::ReleaseNotFound(_) => ErrorKind::NotFound,
            RelsyncError::ReleaseExists(_) | RelsyncError::SyncInProgress(_) => {
                ErrorKind::Conflict
            }
            RelsyncError::DuplicateReleaseName(_) | RelsyncError::UnknownLibrary(_) => {
                ErrorKind::DataIntegrity
            }
            RelsyncError::IndeterminateState { .. }
            | RelsyncError::VersionNotFound
            | RelsyncError::MalformedManifest(_)
            | RelsyncError::MalformedChangeReport(_)
            | RelsyncError::BranchMissing(_)
            | RelsyncError::WorkflowNotFound { .. }
            | RelsyncError::Host { .. }
            | RelsyncError::RateLimited { .. } => ErrorKind::HostIntegration,
            RelsyncError::Store(_)
            | RelsyncError::Config(_)
            | RelsyncError::Io(_)
            | RelsyncError::Yaml(_)
            | RelsyncError::Json(_) => ErrorKind::Internal,
        }
    }

    pub fn store(e: impl fmt::Display) -> Self {
        RelsyncError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelsyncError>;
