//! Per-library release metadata derived from the manifest and change report.
//!
//! Companion modules (names ending in the configured suffix, e.g. `-ktx`)
//! are folded into their root library before any flag is derived, so they
//! never surface as libraries of their own.

use crate::host::HostChange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryFlags {
    pub opted_in: bool,
    pub opted_out: bool,
    pub library_group_release: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledLibrary {
    pub flags: LibraryFlags,
    /// Changes after companion folding. Empty for opted-in libraries.
    pub changes: Vec<HostChange>,
}

/// Final per-library metadata, keyed by library name.
pub type Reconciliation = BTreeMap<String, ReconciledLibrary>;

/// Metadata written for one library: flags plus the version read from its
/// descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryMeta {
    pub updated_version: String,
    pub flags: LibraryFlags,
}

/// Root library name of a companion, or `None` if `name` is not one.
pub fn companion_root<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    if suffix.is_empty() {
        return None;
    }
    name.strip_suffix(suffix).filter(|root| !root.is_empty())
}

/// Repository path of the version descriptor for a library.
///
/// Library names may be gradle-style (`:firebase-firestore`); the colon
/// separators become path segments.
pub fn descriptor_path(name: &str, suffix: &str, version_file: &str) -> String {
    let base = companion_root(name, suffix).unwrap_or(name);
    let dir = base.trim_start_matches(':').replace(':', "/");
    if dir.is_empty() {
        version_file.to_string()
    } else {
        format!("{dir}/{version_file}")
    }
}

/// Fold companion entries of both inputs into their root library.
///
/// A companion's changes are appended to the root's list (creating it if
/// needed), skipping commits the root already carries. Companion names are
/// dropped from the manifest set; the root's own entry decides whether it
/// releases.
pub fn fold_companions(
    library_names: &[String],
    changes_by_library: &BTreeMap<String, Vec<HostChange>>,
    suffix: &str,
) -> (BTreeSet<String>, BTreeMap<String, Vec<HostChange>>) {
    let names: BTreeSet<String> = library_names
        .iter()
        .filter(|n| companion_root(n, suffix).is_none())
        .cloned()
        .collect();

    let mut changes: BTreeMap<String, Vec<HostChange>> = BTreeMap::new();
    // Roots first so a companion's changes land after the root's own.
    for (name, list) in changes_by_library {
        if companion_root(name, suffix).is_none() {
            changes.entry(name.clone()).or_default().extend(list.iter().cloned());
        }
    }
    for (name, list) in changes_by_library {
        let Some(root) = companion_root(name, suffix) else {
            continue;
        };
        let folded = changes.entry(root.to_string()).or_default();
        for c in list {
            if !folded.iter().any(|f| f.commit_id == c.commit_id) {
                folded.push(c.clone());
            }
        }
    }

    (names, changes)
}

/// Derive the opted-in / opted-out / group-release flags for every library
/// named by either input.
pub fn reconcile(
    library_names: &[String],
    changes_by_library: &BTreeMap<String, Vec<HostChange>>,
    suffix: &str,
) -> Reconciliation {
    let (names, mut changes) = fold_companions(library_names, changes_by_library, suffix);

    let union: BTreeSet<String> = names.iter().chain(changes.keys()).cloned().collect();

    union
        .into_iter()
        .map(|name| {
            let in_manifest = names.contains(&name);
            let recorded = changes.remove(&name);
            let flags = LibraryFlags {
                opted_in: in_manifest && recorded.is_none(),
                opted_out: recorded.is_some() && !in_manifest,
                library_group_release: in_manifest
                    && recorded.as_ref().is_some_and(|c| c.is_empty()),
            };
            let lib = ReconciledLibrary {
                flags,
                changes: recorded.unwrap_or_default(),
            };
            (name, lib)
        })
        .collect()
}
