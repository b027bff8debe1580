//! Persistence gateway.
//!
//! `ReleaseStore` is the injected handle every component writes through.
//! Each `replace_*` call is atomic against one collection; `apply_sync`
//! bundles a whole sync's writes in dependency order and may be overridden
//! by stores that can commit them together.

pub mod db;

pub use db::RedbStore;

use crate::error::{RelsyncError, Result};
use crate::host::HostChange;
use crate::reconcile::LibraryMeta;
use crate::types::{
    Change, CheckRun, Library, LibraryView, Release, ReleaseError, ReleasePatch, ReleaseView,
};
use std::collections::BTreeMap;

/// Everything a successful sync writes for one release.
#[derive(Debug, Clone)]
pub struct SyncWrite {
    pub release_id: String,
    pub libraries: BTreeMap<String, LibraryMeta>,
    pub changes: BTreeMap<String, Vec<HostChange>>,
    pub check_runs: Vec<CheckRun>,
    pub patch: ReleasePatch,
}

pub trait ReleaseStore: Send + Sync {
    /// Fails with `ReleaseExists` when the id or the name is taken.
    fn insert_release(&self, release: &Release) -> Result<()>;

    /// Insert a batch; stores that can should make it all-or-nothing.
    fn insert_releases(&self, releases: &[Release]) -> Result<()> {
        releases.iter().try_for_each(|r| self.insert_release(r))
    }

    /// Fails with `ReleaseNotFound` when absent.
    fn get_release(&self, id: &str) -> Result<Release>;

    /// Id of the release with this name. More than one match is a
    /// data-integrity failure, not a negative result.
    fn get_release_by_name(&self, name: &str) -> Result<Option<String>>;

    fn find_release_by_branch(&self, branch: &str) -> Result<Option<Release>>;

    /// All releases ordered by creation time.
    fn list_releases(&self) -> Result<Vec<Release>>;

    /// Upsert the new library set, dropping rows no longer in it.
    fn replace_libraries(
        &self,
        release_id: &str,
        libraries: &BTreeMap<String, LibraryMeta>,
    ) -> Result<Vec<Library>>;

    /// Upsert changes under their owning library rows, dropping stale ones.
    /// Fails with `UnknownLibrary` if an owner has not been written yet.
    fn replace_changes(
        &self,
        release_id: &str,
        changes_by_library: &BTreeMap<String, Vec<HostChange>>,
    ) -> Result<Vec<Change>>;

    fn replace_check_runs(&self, release_id: &str, runs: &[CheckRun]) -> Result<()>;

    /// Validate then apply a partial update.
    fn update_release(&self, id: &str, patch: &ReleasePatch) -> Result<Release>;

    /// Remove a release and every row that references it.
    fn delete_release_cascade(&self, id: &str) -> Result<()>;

    fn record_error(
        &self,
        release_id: &str,
        message: &str,
        stack_trace: &str,
        context_msg: &str,
    ) -> Result<ReleaseError>;

    fn list_libraries(&self, release_id: &str) -> Result<Vec<Library>>;

    fn list_changes(&self, release_id: &str) -> Result<Vec<Change>>;

    fn list_check_runs(&self, release_id: &str) -> Result<Vec<CheckRun>>;

    /// A release by id, falling back to a lookup by name.
    fn resolve_release(&self, id_or_name: &str) -> Result<Release> {
        match self.get_release(id_or_name) {
            Err(RelsyncError::ReleaseNotFound(_)) => match self.get_release_by_name(id_or_name)? {
                Some(id) => self.get_release(&id),
                None => Err(RelsyncError::ReleaseNotFound(id_or_name.to_string())),
            },
            other => other,
        }
    }

    /// Recorded errors, oldest first.
    fn list_errors(&self, release_id: &str) -> Result<Vec<ReleaseError>>;

    /// Persist a sync: libraries, then changes and check runs, then the
    /// release patch last.
    fn apply_sync(&self, write: &SyncWrite) -> Result<Release> {
        self.replace_libraries(&write.release_id, &write.libraries)?;
        self.replace_changes(&write.release_id, &write.changes)?;
        self.replace_check_runs(&write.release_id, &write.check_runs)?;
        self.update_release(&write.release_id, &write.patch)
    }

    /// Denormalized read used by the dashboard.
    fn release_view(&self, release: Release) -> Result<ReleaseView> {
        let mut changes = self.list_changes(&release.id)?;
        let libraries = self
            .list_libraries(&release.id)?
            .into_iter()
            .map(|library| {
                let (own, rest): (Vec<Change>, Vec<Change>) = changes
                    .drain(..)
                    .partition(|c| c.library_id == library.id);
                changes = rest;
                LibraryView {
                    library,
                    changes: own,
                }
            })
            .collect();
        let checks = self.list_check_runs(&release.id)?;
        Ok(ReleaseView {
            release,
            libraries,
            checks,
        })
    }
}
