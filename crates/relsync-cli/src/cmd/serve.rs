use anyhow::Context;
use std::path::Path;

pub fn run(config_path: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    for w in config.validate() {
        tracing::warn!("config: {}", w.message);
    }
    let port = port.unwrap_or(config.server.port);
    let base = crate::root::base_dir(config_path);

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(relsync_server::serve(&config, &base, port))
}
