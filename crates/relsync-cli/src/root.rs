use relsync_core::config::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the config file.
///
/// Priority:
/// 1. `--config` flag / `RELSYNC_CONFIG` env var (passed in as `explicit`)
/// 2. The nearest `relsync.yaml` walking upward from `cwd`
/// 3. `relsync.yaml` in `cwd`, which need not exist
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

/// Directory relative store paths resolve against.
pub fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
