use std::time::Duration;

use async_trait::async_trait;
use relsync_core::config::HostConfig;
use relsync_core::host::{
    parse_change_report, parse_manifest, ChangeReportDoc, HostCheckRun, ManifestDoc, SourceHost,
    WorkflowRun,
};
use relsync_core::{RelsyncError, Result};
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::api::{latest_named, CheckRunsPage, WorkflowRunsPage};
use crate::rate_limit::RateLimitState;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_RAW: &str = "application/vnd.github.raw+json";
const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// GitHubHost
// ---------------------------------------------------------------------------

/// `SourceHost` over the GitHub REST API for one repository.
pub struct GitHubHost {
    http: reqwest::Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    manifest_path: String,
    change_report_path: String,
    build_workflow_name: String,
    per_page: u32,
    rate_limit: RateLimitState,
}

impl GitHubHost {
    /// Build from config, reading the token from the configured env var.
    pub fn new(config: &HostConfig) -> Result<Self> {
        Self::with_token(config, config.token())
    }

    pub fn with_token(config: &HostConfig, token: Option<String>) -> Result<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(RelsyncError::Config(
                "host.owner and host.repo are required".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("relsync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelsyncError::Config(format!("failed to build HTTP client: {e}")))?;
        if token.is_none() {
            warn!(env = %config.token_env, "no GitHub token set; using unauthenticated rate limits");
        }
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token,
            manifest_path: config.manifest_path.clone(),
            change_report_path: config.change_report_path.clone(),
            build_workflow_name: config.build_workflow_name.clone(),
            per_page: config.per_page,
            rate_limit: RateLimitState::new(),
        })
    }

    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate_limit
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{tail}", self.api_url, self.owner, self.repo)
    }

    async fn send(&self, url: &str, accept: &str, query: &[(&str, String)]) -> Result<Response> {
        let mut req = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(|e| RelsyncError::Host {
            status: 0,
            message: format!("request to {url} failed: {e}"),
        })?;
        self.rate_limit.update_from_headers(resp.headers());
        debug!(url, status = %resp.status(), "github response");
        Ok(resp)
    }

    /// Pass successful responses through; turn anything else into an error.
    async fn check(&self, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if self.rate_limit.is_exhausted(status) {
            warn!(
                reset_in_secs = self.rate_limit.retry_after_secs(),
                "github rate limit exhausted"
            );
            return Err(RelsyncError::RateLimited {
                reset_at: self.rate_limit.reset_at(),
            });
        }
        let body = resp.text().await.unwrap_or_default();
        Err(RelsyncError::Host {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self.check(self.send(url, ACCEPT_JSON, query).await?).await?;
        let status = resp.status().as_u16();
        resp.json::<T>().await.map_err(|e| RelsyncError::Host {
            status,
            message: format!("unexpected response body from {url}: {e}"),
        })
    }

    /// Raw file contents at `path` on `branch`; `None` on 404.
    async fn fetch_document(&self, branch: &str, path: &str) -> Result<Option<String>> {
        let url = self.repo_url(&format!("contents/{}", path.trim_start_matches('/')));
        let resp = self
            .send(&url, ACCEPT_RAW, &[("ref", branch.to_string())])
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = self.check(resp).await?;
        let body = resp.text().await.map_err(|e| RelsyncError::Host {
            status: 0,
            message: format!("reading {path}: {e}"),
        })?;
        Ok(Some(body))
    }
}

/// GitHub error bodies are `{"message": ...}`; fall back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// ---------------------------------------------------------------------------
// SourceHost
// ---------------------------------------------------------------------------

#[async_trait]
impl SourceHost for GitHubHost {
    async fn branch_exists(&self, branch: &str) -> Result<bool> {
        let url = self.repo_url(&format!("branches/{branch}"));
        let resp = self.send(&url, ACCEPT_JSON, &[]).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        self.check(resp).await?;
        Ok(true)
    }

    async fn fetch_manifest(&self, branch: &str) -> Result<ManifestDoc> {
        match self.fetch_document(branch, &self.manifest_path).await? {
            Some(raw) => parse_manifest(&raw),
            None => Err(RelsyncError::MalformedManifest(format!(
                "{} not found on '{branch}'",
                self.manifest_path
            ))),
        }
    }

    async fn fetch_change_report(&self, branch: &str) -> Result<ChangeReportDoc> {
        match self.fetch_document(branch, &self.change_report_path).await? {
            Some(raw) => parse_change_report(&raw),
            None => Err(RelsyncError::MalformedChangeReport(format!(
                "{} not found on '{branch}'",
                self.change_report_path
            ))),
        }
    }

    async fn fetch_build_workflow(&self, branch: &str) -> Result<WorkflowRun> {
        let page: WorkflowRunsPage = self
            .get_json(
                &self.repo_url("actions/runs"),
                &[
                    ("branch", branch.to_string()),
                    ("per_page", self.per_page.to_string()),
                ],
            )
            .await?;
        latest_named(page.workflow_runs, &self.build_workflow_name)
            .map(|r| r.into_workflow_run())
            .ok_or_else(|| RelsyncError::WorkflowNotFound {
                workflow: self.build_workflow_name.clone(),
                branch: branch.to_string(),
            })
    }

    async fn list_check_runs(&self, branch: &str) -> Result<Vec<HostCheckRun>> {
        let url = self.repo_url(&format!("commits/{branch}/check-runs"));
        let mut runs: Vec<HostCheckRun> = Vec::new();
        let mut page_no = 1u32;
        loop {
            let page: CheckRunsPage = self
                .get_json(
                    &url,
                    &[
                        ("per_page", self.per_page.to_string()),
                        ("page", page_no.to_string()),
                    ],
                )
                .await?;
            if page.check_runs.is_empty() {
                break;
            }
            runs.extend(page.check_runs.into_iter().map(HostCheckRun::from));
            if runs.len() as u64 >= page.total_count {
                break;
            }
            page_no += 1;
        }
        debug!(branch, count = runs.len(), "check runs listed");
        Ok(runs)
    }

    async fn fetch_version_descriptor(&self, branch: &str, library_path: &str) -> Result<String> {
        self.fetch_document(branch, library_path)
            .await?
            .ok_or_else(|| RelsyncError::Host {
                status: 404,
                message: format!("{library_path} not found on '{branch}'"),
            })
    }
}
