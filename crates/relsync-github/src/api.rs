//! GitHub REST response shapes, trimmed to the fields the engine reads.

use chrono::{DateTime, Utc};
use relsync_core::host::{HostCheckRun, WorkflowRun};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkflowRunsPage {
    #[serde(default)]
    pub workflow_runs: Vec<ApiWorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiWorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ApiWorkflowRun {
    pub fn into_workflow_run(self) -> WorkflowRun {
        WorkflowRun {
            id: self.id,
            name: self.name.unwrap_or_default(),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            conclusion: self.conclusion,
            html_url: self.html_url,
        }
    }
}

/// Most recent run named `workflow_name`.
pub fn latest_named(runs: Vec<ApiWorkflowRun>, workflow_name: &str) -> Option<ApiWorkflowRun> {
    runs.into_iter()
        .filter(|r| r.name.as_deref() == Some(workflow_name))
        .max_by_key(|r| (r.created_at, r.id))
}

#[derive(Debug, Deserialize)]
pub struct CheckRunsPage {
    pub total_count: u64,
    #[serde(default)]
    pub check_runs: Vec<ApiCheckRun>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCheckRun {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub status: String,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub output: Option<ApiCheckOutput>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCheckOutput {
    pub title: Option<String>,
}

impl From<ApiCheckRun> for HostCheckRun {
    fn from(c: ApiCheckRun) -> Self {
        HostCheckRun {
            id: c.id,
            name: c.name,
            head_sha: c.head_sha,
            status: c.status,
            conclusion: c.conclusion,
            output_title: c.output.and_then(|o| o.title),
            html_url: c.html_url,
        }
    }
}
