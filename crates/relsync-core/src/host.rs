//! The source-host seam.
//!
//! `SourceHost` is the read-only view of the external source-control host the
//! orchestrator needs. Documents the host serves are parsed through the
//! explicit functions below, which reject any shape mismatch.

use crate::error::{RelsyncError, Result};
use crate::types::{BuildArtifact, CheckRun};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// Libraries declared to release on a branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestDoc {
    pub libraries: Vec<String>,
}

/// One change as listed in the change report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostChange {
    pub commit_id: String,
    #[serde(default)]
    pub commit_link: Option<String>,
    #[serde(default, alias = "prId")]
    pub pull_request_id: Option<String>,
    #[serde(default, alias = "prLink")]
    pub pull_request_link: Option<String>,
    pub author: String,
    pub message: String,
}

/// Per-library changes since the prior release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReportDoc {
    #[serde(alias = "changesByLibrary")]
    pub changes_by_library_name: BTreeMap<String, Vec<HostChange>>,
}

pub fn parse_manifest(raw: &str) -> Result<ManifestDoc> {
    let doc: ManifestDoc =
        serde_json::from_str(raw).map_err(|e| RelsyncError::MalformedManifest(e.to_string()))?;
    if let Some(blank) = doc.libraries.iter().find(|l| l.trim().is_empty()) {
        return Err(RelsyncError::MalformedManifest(format!(
            "blank library name {blank:?}"
        )));
    }
    Ok(doc)
}

pub fn parse_change_report(raw: &str) -> Result<ChangeReportDoc> {
    let doc: ChangeReportDoc = serde_json::from_str(raw)
        .map_err(|e| RelsyncError::MalformedChangeReport(e.to_string()))?;
    for (lib, changes) in &doc.changes_by_library_name {
        if let Some(c) = changes.iter().find(|c| c.commit_id.trim().is_empty()) {
            return Err(RelsyncError::MalformedChangeReport(format!(
                "change in '{lib}' has an empty commit id (author {})",
                c.author
            )));
        }
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Workflow and check runs
// ---------------------------------------------------------------------------

/// The artifact-building workflow run on a release branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: String,
}

impl WorkflowRun {
    pub fn to_build_artifact(&self) -> BuildArtifact {
        BuildArtifact {
            status: Some(self.status.clone()),
            conclusion: self.conclusion.clone(),
            link: Some(self.html_url.clone()),
            job_id: Some(self.id),
        }
    }
}

/// A check run as reported by the host, before it is tied to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCheckRun {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub output_title: Option<String>,
    pub html_url: Option<String>,
}

impl HostCheckRun {
    pub fn into_check_run(self, release_id: &str) -> CheckRun {
        CheckRun {
            id: self.id,
            release_id: release_id.to_string(),
            name: self.name,
            head_sha: self.head_sha,
            status: self.status,
            conclusion: self.conclusion,
            output_title: self.output_title,
            https_url: self.html_url,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceHost
// ---------------------------------------------------------------------------

/// Read-only adapter over the source-control host.
///
/// Every call is independently retryable and has no local side effects.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// `Ok(false)` when the host says the branch does not exist; any other
    /// failure is an error.
    async fn branch_exists(&self, branch: &str) -> Result<bool>;

    async fn fetch_manifest(&self, branch: &str) -> Result<ManifestDoc>;

    async fn fetch_change_report(&self, branch: &str) -> Result<ChangeReportDoc>;

    /// Fails with `WorkflowNotFound` when no artifact-build run exists.
    async fn fetch_build_workflow(&self, branch: &str) -> Result<WorkflowRun>;

    /// All check runs for the branch head, across every page.
    async fn list_check_runs(&self, branch: &str) -> Result<Vec<HostCheckRun>>;

    /// Raw contents of a library's version descriptor.
    async fn fetch_version_descriptor(&self, branch: &str, library_path: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_library_list() {
        let doc = parse_manifest(r#"{"libraries": ["firebase-common", "firebase-firestore"]}"#)
            .unwrap();
        assert_eq!(doc.libraries.len(), 2);
    }

    #[test]
    fn manifest_rejects_wrong_shape() {
        assert!(matches!(
            parse_manifest(r#"{"libs": []}"#),
            Err(RelsyncError::MalformedManifest(_))
        ));
        assert!(matches!(
            parse_manifest("not json"),
            Err(RelsyncError::MalformedManifest(_))
        ));
        assert!(matches!(
            parse_manifest(r#"{"libraries": ["ok", "  "]}"#),
            Err(RelsyncError::MalformedManifest(_))
        ));
    }

    #[test]
    fn change_report_accepts_short_pr_aliases() {
        let raw = r#"{
            "changesByLibraryName": {
                "firebase-common": [
                    {"commitId": "abc123", "prId": "42", "prLink": "https://x/pull/42",
                     "author": "octocat", "message": "Fix crash\n\nDetails"}
                ],
                "firebase-installations": []
            }
        }"#;
        let doc = parse_change_report(raw).unwrap();
        let common = &doc.changes_by_library_name["firebase-common"];
        assert_eq!(common[0].pull_request_id.as_deref(), Some("42"));
        assert!(common[0].commit_link.is_none());
        assert!(doc.changes_by_library_name["firebase-installations"].is_empty());
    }

    #[test]
    fn change_report_rejects_missing_author() {
        let raw = r#"{"changesByLibraryName": {"lib": [{"commitId": "a", "message": "m"}]}}"#;
        assert!(matches!(
            parse_change_report(raw),
            Err(RelsyncError::MalformedChangeReport(_))
        ));
    }

    #[test]
    fn workflow_run_maps_to_build_artifact() {
        let run = WorkflowRun {
            id: 99,
            name: "Build Release Artifacts".into(),
            status: "completed".into(),
            conclusion: Some("success".into()),
            html_url: "https://github.com/o/r/actions/runs/99".into(),
        };
        let artifact = run.to_build_artifact();
        assert_eq!(artifact.job_id, Some(99));
        assert_eq!(artifact.conclusion.as_deref(), Some("success"));
    }
}
