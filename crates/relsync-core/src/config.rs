use crate::error::{RelsyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "relsync.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    #[serde(default = "default_change_report_path")]
    pub change_report_path: String,
    #[serde(default = "default_build_workflow_name")]
    pub build_workflow_name: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_companion_suffix")]
    pub companion_suffix: String,
    #[serde(default = "default_version_file")]
    pub version_file: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_web_url() -> String {
    "https://github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_manifest_path() -> String {
    "release.json".to_string()
}

fn default_change_report_path() -> String {
    "release_report.json".to_string()
}

fn default_build_workflow_name() -> String {
    "Build Release Artifacts".to_string()
}

fn default_branch_prefix() -> String {
    "releases/".to_string()
}

fn default_companion_suffix() -> String {
    "-ktx".to_string()
}

fn default_version_file() -> String {
    "gradle.properties".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            web_url: default_web_url(),
            owner: String::new(),
            repo: String::new(),
            token_env: default_token_env(),
            manifest_path: default_manifest_path(),
            change_report_path: default_change_report_path(),
            build_workflow_name: default_build_workflow_name(),
            branch_prefix: default_branch_prefix(),
            companion_suffix: default_companion_suffix(),
            version_file: default_version_file(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HostConfig {
    pub fn branch_name(&self, release_name: &str) -> String {
        format!("{}{release_name}", self.branch_prefix)
    }

    pub fn branch_link(&self, branch: &str) -> String {
        format!(
            "{}/{}/{}/tree/{branch}",
            self.web_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }

    /// Token from the configured environment variable, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / StoreConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,
}

fn default_port() -> u16 {
    3141
}

fn default_webhook_secret_env() -> String {
    "RELSYNC_WEBHOOK_SECRET".to_string()
}

fn default_api_token_env() -> String {
    "RELSYNC_API_TOKEN".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            webhook_secret_env: default_webhook_secret_env(),
            api_token_env: default_api_token_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".relsync/relsync.redb")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(data)?;
        if config.host.per_page == 0 || config.host.per_page > 100 {
            return Err(RelsyncError::Config(format!(
                "host.per_page must be between 1 and 100, got {}",
                config.host.per_page
            )));
        }
        Ok(config)
    }

    /// Store path resolved against the directory holding the config file.
    pub fn store_path(&self, base: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            base.join(&self.store.path)
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.host.owner.is_empty() || self.host.repo.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "host.owner and host.repo must be set to reach the source host".into(),
            });
        }
        if self.host.companion_suffix.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "host.companion_suffix is empty; no companion folding will happen"
                    .into(),
            });
        }
        if self.host.branch_prefix.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "host.branch_prefix is empty; release branches are named after releases"
                    .into(),
            });
        }
        warnings
    }
}
