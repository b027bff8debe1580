use std::path::Path;
use std::sync::Arc;

use relsync_core::config::{Config, HostConfig};
use relsync_core::host::SourceHost;
use relsync_core::store::{RedbStore, ReleaseStore};
use relsync_core::sync::SyncOrchestrator;
use relsync_github::GitHubHost;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReleaseStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub host: Arc<HostConfig>,
    /// HMAC key for `/api/webhook`. `None` rejects every delivery.
    pub webhook_secret: Option<String>,
    /// Bearer token for the error log. `None` rejects every request.
    pub api_token: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        source: Arc<dyn SourceHost>,
        host: HostConfig,
        webhook_secret: Option<String>,
        api_token: Option<String>,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&store),
            source,
            host.companion_suffix.clone(),
            host.version_file.clone(),
        ));
        Self {
            store,
            orchestrator,
            host: Arc::new(host),
            webhook_secret,
            api_token,
        }
    }

    /// Open the configured store and GitHub client; secrets come from the
    /// environment variables the config names.
    pub fn from_config(config: &Config, base: &Path) -> anyhow::Result<Self> {
        let store = Arc::new(RedbStore::open(&config.store_path(base))?);
        let source = Arc::new(GitHubHost::new(&config.host)?);
        Ok(Self::new(
            store,
            source,
            config.host.clone(),
            read_secret(&config.server.webhook_secret_env),
            read_secret(&config.server.api_token_env),
        ))
    }
}

fn read_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}
