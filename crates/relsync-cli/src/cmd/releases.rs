use crate::output::{fmt_time, or_dash, print_json, print_table};
use relsync_core::store::ReleaseStore;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(config_path, &config)?;
    let releases = store.list_releases()?;

    if json {
        let views = releases
            .into_iter()
            .map(|r| store.release_view(r))
            .collect::<Result<Vec<_>, _>>()?;
        return print_json(&views);
    }

    if releases.is_empty() {
        println!("No releases.");
        return Ok(());
    }
    let rows = releases
        .iter()
        .map(|r| {
            vec![
                r.name.clone(),
                r.state.to_string(),
                fmt_time(r.code_freeze_date),
                fmt_time(r.release_date),
                r.branch_name.clone(),
                or_dash(r.build_artifact.conclusion.as_deref()),
                r.id.clone(),
            ]
        })
        .collect();
    print_table(
        &["NAME", "STATE", "CODE FREEZE", "RELEASE", "BRANCH", "BUILD", "ID"],
        rows,
    );
    Ok(())
}
