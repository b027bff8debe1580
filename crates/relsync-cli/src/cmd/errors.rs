use crate::output::{fmt_time, print_json, print_table};
use relsync_core::store::ReleaseStore;
use std::path::Path;

pub fn run(config_path: &Path, release: &str, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(config_path, &config)?;
    let release = store.resolve_release(release)?;
    let mut errors = store.list_errors(&release.id)?;
    errors.reverse();

    if json {
        return print_json(&errors);
    }
    if errors.is_empty() {
        println!("No errors recorded for {}.", release.name);
        return Ok(());
    }
    let rows = errors
        .iter()
        .map(|e| {
            vec![
                fmt_time(e.timestamp),
                e.context_msg.clone(),
                e.message.clone(),
            ]
        })
        .collect();
    print_table(&["WHEN", "CONTEXT", "MESSAGE"], rows);
    Ok(())
}
