//! redb-backed release store.
//!
//! # Table design
//!
//! One table per collection, JSON values, string keys:
//! ```text
//! releases      <release_id>
//! libraries     <release_id>/<library_id>
//! changes       <release_id>/<library_id>/<commit_id>
//! check_runs    <release_id>/<check_run_id>
//! errors        <release_id>/<timestamp_ms: 16 hex digits>/<uuid>
//! ```
//!
//! Every dependent key starts with `<release_id>/`, so a single prefix range
//! scan enumerates (or deletes) all rows belonging to a release. The fixed
//! width hex timestamp makes the error scan chronological.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{RelsyncError, Result};
use crate::host::HostChange;
use crate::reconcile::LibraryMeta;
use crate::types::{
    commit_title, library_id, Change, CheckRun, Library, Release, ReleaseError, ReleasePatch,
};
use crate::validation::validate_patch;

use super::{ReleaseStore, SyncWrite};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");
const LIBRARIES: TableDefinition<&str, &[u8]> = TableDefinition::new("libraries");
const CHANGES: TableDefinition<&str, &[u8]> = TableDefinition::new("changes");
const CHECK_RUNS: TableDefinition<&str, &[u8]> = TableDefinition::new("check_runs");
const ERRORS: TableDefinition<&str, &[u8]> = TableDefinition::new("errors");

type JsonTable<'txn> = redb::Table<'txn, &'static str, &'static [u8]>;

// ---------------------------------------------------------------------------
// Key and codec helpers
// ---------------------------------------------------------------------------

fn prefix(release_id: &str) -> String {
    format!("{release_id}/")
}

fn child_key(release_id: &str, row: &str) -> String {
    format!("{release_id}/{row}")
}

fn error_key(release_id: &str, err: &ReleaseError) -> String {
    let ms = err.timestamp.timestamp_millis().max(0) as u64;
    format!("{release_id}/{ms:016x}/{}", err.id)
}

fn put<T: Serialize>(table: &mut JsonTable<'_>, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    table
        .insert(key, bytes.as_slice())
        .map_err(RelsyncError::store)?;
    Ok(())
}

fn scan<T, R>(table: &R, prefix: &str) -> Result<Vec<(String, T)>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..).map_err(RelsyncError::store)? {
        let (k, v) = entry.map_err(RelsyncError::store)?;
        let key = k.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.to_string(), serde_json::from_slice(v.value())?));
    }
    Ok(out)
}

fn scan_keys<R>(table: &R, prefix: &str) -> Result<Vec<String>>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..).map_err(RelsyncError::store)? {
        let (k, _) = entry.map_err(RelsyncError::store)?;
        let key = k.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push(key.to_string());
    }
    Ok(out)
}

/// Delete every key under `prefix` not listed in `keep`. Returns the count.
fn remove_stale(table: &mut JsonTable<'_>, prefix: &str, keep: &HashSet<String>) -> Result<usize> {
    let stale: Vec<String> = scan_keys(table, prefix)?
        .into_iter()
        .filter(|k| !keep.contains(k))
        .collect();
    for key in &stale {
        table.remove(key.as_str()).map_err(RelsyncError::store)?;
    }
    Ok(stale.len())
}

fn load_release<R>(table: &R, id: &str) -> Result<Release>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let guard = table
        .get(id)
        .map_err(RelsyncError::store)?
        .ok_or_else(|| RelsyncError::ReleaseNotFound(id.to_string()))?;
    Ok(serde_json::from_slice(guard.value())?)
}

fn all_releases<R>(table: &R) -> Result<Vec<Release>>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out: Vec<Release> = Vec::new();
    for entry in table.iter().map_err(RelsyncError::store)? {
        let (_, v) = entry.map_err(RelsyncError::store)?;
        out.push(serde_json::from_slice(v.value())?);
    }
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(out)
}

// ---------------------------------------------------------------------------
// Transaction-scoped operations
//
// Shared by the per-collection methods (one transaction each) and by
// `apply_sync` (one transaction for all of them).
// ---------------------------------------------------------------------------

/// Insert a new release row. The id and the name must both be unused; the
/// name check runs inside the caller's write transaction.
fn insert_new_release(wt: &WriteTransaction, release: &Release) -> Result<()> {
    let mut table = wt.open_table(RELEASES).map_err(RelsyncError::store)?;
    if table
        .get(release.id.as_str())
        .map_err(RelsyncError::store)?
        .is_some()
    {
        return Err(RelsyncError::ReleaseExists(release.id.clone()));
    }
    if all_releases(&table)?.iter().any(|r| r.name == release.name) {
        return Err(RelsyncError::ReleaseExists(release.name.clone()));
    }
    put(&mut table, &release.id, release)
}

fn ensure_release(wt: &WriteTransaction, id: &str) -> Result<Release> {
    let table = wt.open_table(RELEASES).map_err(RelsyncError::store)?;
    load_release(&table, id)
}

fn write_libraries(
    wt: &WriteTransaction,
    release_id: &str,
    libraries: &BTreeMap<String, LibraryMeta>,
) -> Result<Vec<Library>> {
    ensure_release(wt, release_id)?;
    let rows: Vec<Library> = libraries
        .iter()
        .map(|(name, meta)| Library {
            id: library_id(name, &meta.updated_version),
            release_id: release_id.to_string(),
            library_name: name.clone(),
            updated_version: meta.updated_version.clone(),
            opted_in: meta.flags.opted_in,
            opted_out: meta.flags.opted_out,
            library_group_release: meta.flags.library_group_release,
        })
        .collect();

    let mut table = wt.open_table(LIBRARIES).map_err(RelsyncError::store)?;
    let keep: HashSet<String> = rows.iter().map(|l| child_key(release_id, &l.id)).collect();
    let removed = remove_stale(&mut table, &prefix(release_id), &keep)?;
    for lib in &rows {
        put(&mut table, &child_key(release_id, &lib.id), lib)?;
    }
    debug!(release_id, written = rows.len(), removed, "libraries replaced");
    Ok(rows)
}

fn write_changes(
    wt: &WriteTransaction,
    release_id: &str,
    changes_by_library: &BTreeMap<String, Vec<HostChange>>,
) -> Result<Vec<Change>> {
    ensure_release(wt, release_id)?;
    let owners: HashMap<String, String> = {
        let libs = wt.open_table(LIBRARIES).map_err(RelsyncError::store)?;
        scan::<Library, _>(&libs, &prefix(release_id))?
            .into_iter()
            .map(|(_, l)| (l.library_name, l.id))
            .collect()
    };

    let mut rows = Vec::new();
    for (library_name, changes) in changes_by_library {
        let owner = owners
            .get(library_name)
            .ok_or_else(|| RelsyncError::UnknownLibrary(library_name.clone()))?;
        for c in changes {
            rows.push(Change {
                id: c.commit_id.clone(),
                release_id: release_id.to_string(),
                library_id: owner.clone(),
                commit_id: c.commit_id.clone(),
                commit_link: c.commit_link.clone(),
                pull_request_id: c.pull_request_id.clone(),
                pull_request_link: c.pull_request_link.clone(),
                author: c.author.clone(),
                commit_title: commit_title(&c.message),
                message: c.message.clone(),
            });
        }
    }

    let key_of = |c: &Change| child_key(release_id, &format!("{}/{}", c.library_id, c.commit_id));
    let mut table = wt.open_table(CHANGES).map_err(RelsyncError::store)?;
    let keep: HashSet<String> = rows.iter().map(key_of).collect();
    let removed = remove_stale(&mut table, &prefix(release_id), &keep)?;
    for change in &rows {
        put(&mut table, &key_of(change), change)?;
    }
    debug!(release_id, written = rows.len(), removed, "changes replaced");
    Ok(rows)
}

fn write_check_runs(wt: &WriteTransaction, release_id: &str, runs: &[CheckRun]) -> Result<()> {
    ensure_release(wt, release_id)?;
    let mut table = wt.open_table(CHECK_RUNS).map_err(RelsyncError::store)?;
    let keep: HashSet<String> = runs
        .iter()
        .map(|r| child_key(release_id, &r.id.to_string()))
        .collect();
    let removed = remove_stale(&mut table, &prefix(release_id), &keep)?;
    for run in runs {
        let mut run = run.clone();
        run.release_id = release_id.to_string();
        put(&mut table, &child_key(release_id, &run.id.to_string()), &run)?;
    }
    debug!(release_id, written = runs.len(), removed, "check runs replaced");
    Ok(())
}

fn write_release_patch(wt: &WriteTransaction, id: &str, patch: &ReleasePatch) -> Result<Release> {
    let mut table = wt.open_table(RELEASES).map_err(RelsyncError::store)?;
    let mut release = load_release(&table, id)?;
    let others = all_releases(&table)?;
    let issues = validate_patch(&release, patch, &others);
    if !issues.is_empty() {
        return Err(RelsyncError::Validation(issues));
    }
    patch.apply(&mut release);
    put(&mut table, id, &release)?;
    Ok(release)
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, creating every table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(RelsyncError::store)?;
        let wt = db.begin_write().map_err(RelsyncError::store)?;
        for def in [RELEASES, LIBRARIES, CHANGES, CHECK_RUNS, ERRORS] {
            wt.open_table(def).map_err(RelsyncError::store)?;
        }
        wt.commit().map_err(RelsyncError::store)?;
        Ok(Self { db })
    }

    /// Run `f` inside one write transaction, committing only on success.
    fn write<T>(&self, f: impl FnOnce(&WriteTransaction) -> Result<T>) -> Result<T> {
        let wt = self.db.begin_write().map_err(RelsyncError::store)?;
        let out = f(&wt)?;
        wt.commit().map_err(RelsyncError::store)?;
        Ok(out)
    }

    fn read_prefix<T: DeserializeOwned>(
        &self,
        def: TableDefinition<&str, &[u8]>,
        release_id: &str,
    ) -> Result<Vec<T>> {
        let rt = self.db.begin_read().map_err(RelsyncError::store)?;
        let table = rt.open_table(def).map_err(RelsyncError::store)?;
        Ok(scan(&table, &prefix(release_id))?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }
}

impl ReleaseStore for RedbStore {
    fn insert_release(&self, release: &Release) -> Result<()> {
        self.write(|wt| insert_new_release(wt, release))
    }

    fn insert_releases(&self, releases: &[Release]) -> Result<()> {
        self.write(|wt| releases.iter().try_for_each(|r| insert_new_release(wt, r)))
    }

    fn get_release(&self, id: &str) -> Result<Release> {
        let rt = self.db.begin_read().map_err(RelsyncError::store)?;
        let table = rt.open_table(RELEASES).map_err(RelsyncError::store)?;
        load_release(&table, id)
    }

    fn get_release_by_name(&self, name: &str) -> Result<Option<String>> {
        let matches: Vec<String> = self
            .list_releases()?
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| r.id)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.into_iter().next()),
            _ => Err(RelsyncError::DuplicateReleaseName(name.to_string())),
        }
    }

    fn find_release_by_branch(&self, branch: &str) -> Result<Option<Release>> {
        Ok(self
            .list_releases()?
            .into_iter()
            .find(|r| r.branch_name == branch))
    }

    fn list_releases(&self) -> Result<Vec<Release>> {
        let rt = self.db.begin_read().map_err(RelsyncError::store)?;
        let table = rt.open_table(RELEASES).map_err(RelsyncError::store)?;
        all_releases(&table)
    }

    fn replace_libraries(
        &self,
        release_id: &str,
        libraries: &BTreeMap<String, LibraryMeta>,
    ) -> Result<Vec<Library>> {
        self.write(|wt| write_libraries(wt, release_id, libraries))
    }

    fn replace_changes(
        &self,
        release_id: &str,
        changes_by_library: &BTreeMap<String, Vec<HostChange>>,
    ) -> Result<Vec<Change>> {
        self.write(|wt| write_changes(wt, release_id, changes_by_library))
    }

    fn replace_check_runs(&self, release_id: &str, runs: &[CheckRun]) -> Result<()> {
        self.write(|wt| write_check_runs(wt, release_id, runs))
    }

    fn update_release(&self, id: &str, patch: &ReleasePatch) -> Result<Release> {
        self.write(|wt| write_release_patch(wt, id, patch))
    }

    fn delete_release_cascade(&self, id: &str) -> Result<()> {
        self.write(|wt| {
            ensure_release(wt, id)?;
            let keep = HashSet::new();
            for def in [LIBRARIES, CHANGES, CHECK_RUNS, ERRORS] {
                let mut table = wt.open_table(def).map_err(RelsyncError::store)?;
                remove_stale(&mut table, &prefix(id), &keep)?;
            }
            let mut releases = wt.open_table(RELEASES).map_err(RelsyncError::store)?;
            releases.remove(id).map_err(RelsyncError::store)?;
            Ok(())
        })
    }

    fn record_error(
        &self,
        release_id: &str,
        message: &str,
        stack_trace: &str,
        context_msg: &str,
    ) -> Result<ReleaseError> {
        let err = ReleaseError {
            id: Uuid::new_v4(),
            release_id: release_id.to_string(),
            message: message.to_string(),
            stack_trace: stack_trace.to_string(),
            context_msg: context_msg.to_string(),
            timestamp: Utc::now(),
        };
        self.write(|wt| {
            let mut table = wt.open_table(ERRORS).map_err(RelsyncError::store)?;
            put(&mut table, &error_key(release_id, &err), &err)
        })?;
        Ok(err)
    }

    fn list_libraries(&self, release_id: &str) -> Result<Vec<Library>> {
        let mut libs: Vec<Library> = self.read_prefix(LIBRARIES, release_id)?;
        libs.sort_by(|a, b| a.library_name.cmp(&b.library_name));
        Ok(libs)
    }

    fn list_changes(&self, release_id: &str) -> Result<Vec<Change>> {
        self.read_prefix(CHANGES, release_id)
    }

    fn list_check_runs(&self, release_id: &str) -> Result<Vec<CheckRun>> {
        self.read_prefix(CHECK_RUNS, release_id)
    }

    fn list_errors(&self, release_id: &str) -> Result<Vec<ReleaseError>> {
        self.read_prefix(ERRORS, release_id)
    }

    /// All four writes commit together or not at all.
    fn apply_sync(&self, write: &SyncWrite) -> Result<Release> {
        self.write(|wt| {
            write_libraries(wt, &write.release_id, &write.libraries)?;
            write_changes(wt, &write.release_id, &write.changes)?;
            write_check_runs(wt, &write.release_id, &write.check_runs)?;
            write_release_patch(wt, &write.release_id, &write.patch)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
