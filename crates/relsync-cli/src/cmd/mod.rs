pub mod classify;
pub mod config;
pub mod errors;
pub mod releases;
pub mod serve;
pub mod sync;

use anyhow::Context;
use relsync_core::config::Config;
use relsync_core::store::RedbStore;
use std::path::Path;

pub(crate) fn load_config(config_path: &Path) -> anyhow::Result<Config> {
    Config::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))
}

/// Open the store the config points at, creating it on first use.
pub(crate) fn open_store(config_path: &Path, config: &Config) -> anyhow::Result<RedbStore> {
    let path = config.store_path(&crate::root::base_dir(config_path));
    RedbStore::open(&path).with_context(|| format!("failed to open store {}", path.display()))
}
