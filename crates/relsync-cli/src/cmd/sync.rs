use crate::output::{fmt_time, print_json};
use relsync_core::config::WarnLevel;
use relsync_core::sync::SyncOrchestrator;
use relsync_github::GitHubHost;
use std::path::Path;
use std::sync::Arc;

pub fn run(config_path: &Path, release: &str, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    if let Some(w) = config
        .validate()
        .into_iter()
        .find(|w| w.level == WarnLevel::Error)
    {
        anyhow::bail!("{}", w.message);
    }

    let store = Arc::new(super::open_store(config_path, &config)?);
    let host = Arc::new(GitHubHost::new(&config.host)?);
    let orchestrator = SyncOrchestrator::new(
        store,
        host,
        config.host.companion_suffix.clone(),
        config.host.version_file.clone(),
    );
    let id = orchestrator.resolve(release)?;

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(orchestrator.sync(&id))?;

    if json {
        return print_json(&outcome);
    }
    let r = &outcome.release;
    println!("{} ({}) is {}", r.name, r.id, r.state);
    if outcome.fetched {
        println!(
            "  {} libraries, {} changes, {} check runs",
            outcome.libraries, outcome.changes, outcome.check_runs
        );
        if let Some(url) = r.build_artifact.link.as_deref() {
            println!("  build: {url}");
        }
    } else {
        println!("  state only; nothing fetched from the host");
    }
    println!("  updated {}", fmt_time(r.updated_at));
    Ok(())
}
