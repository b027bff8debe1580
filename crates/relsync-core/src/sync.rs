//! End-to-end sync of one release against the source host.
//!
//! ```text
//! Loaded -> Classified -> NoFetchNeeded
//!                      -> Fetched -> Reconciled -> Persisted
//!                                              -> Failed (ERROR + one ReleaseError row)
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::{classify, Classification};
use crate::error::{RelsyncError, Result};
use crate::host::SourceHost;
use crate::reconcile::{descriptor_path, reconcile, LibraryMeta};
use crate::store::{ReleaseStore, SyncWrite};
use crate::types::{Release, ReleasePatch, ReleaseState};
use crate::version::extract_version;

/// What a completed sync did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub release: Release,
    /// False when only the state was updated.
    pub fetched: bool,
    pub libraries: usize,
    pub changes: usize,
    pub check_runs: usize,
}

impl SyncOutcome {
    fn state_only(release: Release) -> Self {
        Self {
            release,
            fetched: false,
            libraries: 0,
            changes: 0,
            check_runs: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

type LeaseTable = Arc<Mutex<HashSet<String>>>;

/// Held for the duration of one sync; releases the id on drop.
struct Lease {
    table: LeaseTable,
    release_id: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut held = self.table.lock().unwrap_or_else(|p| p.into_inner());
        held.remove(&self.release_id);
    }
}

// ---------------------------------------------------------------------------
// Step failures
// ---------------------------------------------------------------------------

struct Failure {
    context: String,
    error: RelsyncError,
}

trait StepContext<T> {
    fn step(self, context: impl Into<String>) -> std::result::Result<T, Failure>;
}

impl<T> StepContext<T> for Result<T> {
    fn step(self, context: impl Into<String>) -> std::result::Result<T, Failure> {
        self.map_err(|error| Failure {
            context: context.into(),
            error,
        })
    }
}

fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![format!("{e:?}")];
    let mut cur = e.source();
    while let Some(cause) = cur {
        lines.push(format!("caused by: {cause}"));
        cur = cause.source();
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    store: Arc<dyn ReleaseStore>,
    host: Arc<dyn SourceHost>,
    companion_suffix: String,
    version_file: String,
    leases: LeaseTable,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn ReleaseStore>,
        host: Arc<dyn SourceHost>,
        companion_suffix: impl Into<String>,
        version_file: impl Into<String>,
    ) -> Self {
        Self {
            store,
            host,
            companion_suffix: companion_suffix.into(),
            version_file: version_file.into(),
            leases: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn ReleaseStore> {
        &self.store
    }

    /// Resolve a release id, falling back to a lookup by name.
    pub fn resolve(&self, id_or_name: &str) -> Result<String> {
        self.store.resolve_release(id_or_name).map(|r| r.id)
    }

    /// Run a store call on the blocking pool; redb commits are synchronous
    /// disk I/O.
    async fn on_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ReleaseStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| RelsyncError::Store(format!("store task failed: {e}")))?
    }

    fn try_lease(&self, release_id: &str) -> Result<Lease> {
        let mut held = self.leases.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(release_id.to_string()) {
            return Err(RelsyncError::SyncInProgress(release_id.to_string()));
        }
        Ok(Lease {
            table: Arc::clone(&self.leases),
            release_id: release_id.to_string(),
        })
    }

    pub async fn sync(&self, release_id: &str) -> Result<SyncOutcome> {
        self.sync_at(release_id, Utc::now()).await
    }

    /// Run one sync as of `now`.
    pub async fn sync_at(&self, release_id: &str, now: DateTime<Utc>) -> Result<SyncOutcome> {
        let _lease = self.try_lease(release_id)?;
        let id = release_id.to_string();
        let release = self.on_store(move |s| s.get_release(&id)).await?;

        let classification = match classify(
            release.code_freeze_date,
            release.release_date,
            release.is_complete,
            now,
        ) {
            Ok(c) => c,
            Err(e) => {
                return Err(self
                    .fail(&release, "classifying release dates".into(), e)
                    .await)
            }
        };
        debug!(
            release_id,
            state = %classification.state,
            days_until_code_freeze = classification.days_until_code_freeze,
            days_until_release = classification.days_until_release,
            "classified"
        );

        if !classification.state.needs_host_data() {
            return self.update_state(&release, classification.state).await;
        }

        match self.fetch_and_persist(&release, classification).await {
            Ok(outcome) => Ok(outcome),
            Err(Failure { context, error }) => Err(self.fail(&release, context, error).await),
        }
    }

    async fn update_state(&self, release: &Release, state: ReleaseState) -> Result<SyncOutcome> {
        let id = release.id.clone();
        let updated = self
            .on_store(move |s| s.update_release(&id, &ReleasePatch::state_only(state)))
            .await?;
        if release.state != state {
            info!(release_id = %release.id, from = %release.state, to = %state, "state changed");
        }
        Ok(SyncOutcome::state_only(updated))
    }

    async fn fetch_and_persist(
        &self,
        release: &Release,
        classification: Classification,
    ) -> std::result::Result<SyncOutcome, Failure> {
        let branch = release.branch_name.as_str();

        let exists = self
            .host
            .branch_exists(branch)
            .await
            .step(format!("probing release branch '{branch}'"))?;
        if !exists {
            if !classification.code_freeze_passed() {
                debug!(release_id = %release.id, branch, "branch not cut yet");
                return self
                    .update_state(release, classification.state)
                    .await
                    .step("updating release state");
            }
            return Err(Failure {
                context: format!("release passed code freeze without branch '{branch}'"),
                error: RelsyncError::BranchMissing(branch.to_string()),
            });
        }

        let (manifest, report, workflow) = futures::try_join!(
            async {
                self.host
                    .fetch_manifest(branch)
                    .await
                    .step(format!("fetching release manifest on '{branch}'"))
            },
            async {
                self.host
                    .fetch_change_report(branch)
                    .await
                    .step(format!("fetching change report on '{branch}'"))
            },
            async {
                self.host
                    .fetch_build_workflow(branch)
                    .await
                    .step(format!("fetching build workflow on '{branch}'"))
            },
        )?;

        let reconciled = reconcile(
            &manifest.libraries,
            &report.changes_by_library_name,
            &self.companion_suffix,
        );

        let versions = try_join_all(reconciled.keys().map(|name| {
            let path = descriptor_path(name, &self.companion_suffix, &self.version_file);
            async move {
                let raw = self
                    .host
                    .fetch_version_descriptor(branch, &path)
                    .await
                    .step(format!("fetching version descriptor '{path}'"))?;
                extract_version(&raw).step(format!("reading version of '{name}' from '{path}'"))
            }
        }))
        .await?;

        let mut libraries = BTreeMap::new();
        let mut changes = BTreeMap::new();
        for ((name, lib), updated_version) in reconciled.into_iter().zip(versions) {
            libraries.insert(
                name.clone(),
                LibraryMeta {
                    updated_version,
                    flags: lib.flags,
                },
            );
            changes.insert(name, lib.changes);
        }

        let check_runs: Vec<_> = self
            .host
            .list_check_runs(branch)
            .await
            .step(format!("listing check runs on '{branch}'"))?
            .into_iter()
            .map(|c| c.into_check_run(&release.id))
            .collect();

        let write = SyncWrite {
            release_id: release.id.clone(),
            libraries,
            changes,
            check_runs,
            patch: ReleasePatch::sync_result(
                classification.state,
                Some(workflow.to_build_artifact()),
            ),
        };
        let libraries = write.libraries.len();
        let changes = write.changes.values().map(Vec::len).sum();
        let check_runs = write.check_runs.len();
        let updated = self
            .on_store(move |s| s.apply_sync(&write))
            .await
            .step("persisting sync results")?;

        let outcome = SyncOutcome {
            release: updated,
            fetched: true,
            libraries,
            changes,
            check_runs,
        };
        info!(
            release_id = %release.id,
            state = %outcome.release.state,
            libraries = outcome.libraries,
            changes = outcome.changes,
            check_runs = outcome.check_runs,
            "release synced"
        );
        Ok(outcome)
    }

    /// Record the failure, move the release to ERROR, hand the error back.
    async fn fail(&self, release: &Release, context: String, error: RelsyncError) -> RelsyncError {
        warn!(release_id = %release.id, context = %context, error = %error, "sync failed");
        let id = release.id.clone();
        let message = error.to_string();
        let chain = error_chain(&error);
        let recorded = self
            .on_store(move |s| {
                let row = s.record_error(&id, &message, &chain, &context);
                let marked = s.update_release(&id, &ReleasePatch::state_only(ReleaseState::Error));
                Ok((row, marked))
            })
            .await;
        match recorded {
            Ok((row, marked)) => {
                if let Err(e) = row {
                    warn!(release_id = %release.id, error = %e, "could not record sync error");
                }
                if let Err(e) = marked {
                    warn!(release_id = %release.id, error = %e, "could not set ERROR state");
                }
            }
            Err(e) => warn!(release_id = %release.id, error = %e, "could not record sync error"),
        }
        error
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        parse_change_report, parse_manifest, ChangeReportDoc, HostChange, HostCheckRun,
        ManifestDoc, WorkflowRun,
    };
    use crate::store::RedbStore;
    use crate::types::{Change, CheckRun, Library, ReleaseError};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SUFFIX: &str = "-ktx";
    const VERSION_FILE: &str = "gradle.properties";

    struct FakeHost {
        branch: bool,
        manifest: String,
        report: String,
        workflow: Option<WorkflowRun>,
        checks: Vec<HostCheckRun>,
        versions: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeHost {
        fn healthy() -> Self {
            Self {
                branch: true,
                manifest: r#"{"libraries": [
                    "firebase-common", "firebase-firestore", "firebase-firestore-ktx"
                ]}"#
                .into(),
                report: r#"{"changesByLibraryName": {
                    "firebase-common": [
                        {"commitId": "c1", "author": "a", "message": "Fix crash\n\nbody"}
                    ],
                    "firebase-firestore-ktx": [
                        {"commitId": "c2", "author": "b", "message": "Add ktx api"}
                    ],
                    "firebase-abt": []
                }}"#
                .into(),
                workflow: Some(WorkflowRun {
                    id: 7,
                    name: "Build Release Artifacts".into(),
                    status: "completed".into(),
                    conclusion: Some("success".into()),
                    html_url: "https://github.com/o/r/actions/runs/7".into(),
                }),
                checks: vec![HostCheckRun {
                    id: 11,
                    name: "unit-tests".into(),
                    head_sha: "abc".into(),
                    status: "completed".into(),
                    conclusion: Some("success".into()),
                    output_title: None,
                    html_url: None,
                }],
                versions: HashMap::from([
                    ("firebase-common/gradle.properties".into(), "version=20.1.0\n".into()),
                    ("firebase-firestore/gradle.properties".into(), "# x\nVersion = 24.0.0".into()),
                    ("firebase-abt/gradle.properties".into(), "version=21.0.0".into()),
                ]),
                calls: AtomicUsize::new(0),
            }
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SourceHost for FakeHost {
        async fn branch_exists(&self, _branch: &str) -> Result<bool> {
            self.hit();
            Ok(self.branch)
        }

        async fn fetch_manifest(&self, _branch: &str) -> Result<ManifestDoc> {
            self.hit();
            parse_manifest(&self.manifest)
        }

        async fn fetch_change_report(&self, _branch: &str) -> Result<ChangeReportDoc> {
            self.hit();
            parse_change_report(&self.report)
        }

        async fn fetch_build_workflow(&self, branch: &str) -> Result<WorkflowRun> {
            self.hit();
            self.workflow.clone().ok_or_else(|| RelsyncError::WorkflowNotFound {
                workflow: "Build Release Artifacts".into(),
                branch: branch.into(),
            })
        }

        async fn list_check_runs(&self, _branch: &str) -> Result<Vec<HostCheckRun>> {
            self.hit();
            Ok(self.checks.clone())
        }

        async fn fetch_version_descriptor(&self, _branch: &str, path: &str) -> Result<String> {
            self.hit();
            self.versions.get(path).cloned().ok_or(RelsyncError::Host {
                status: 404,
                message: format!("{path} not found"),
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        store: Arc<RedbStore>,
        host: Arc<FakeHost>,
        orchestrator: SyncOrchestrator,
    }

    fn fixture(host: FakeHost) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RedbStore::open(&dir.path().join("sync.redb")).unwrap());
        let host = Arc::new(host);
        let orchestrator = SyncOrchestrator::new(store.clone(), host.clone(), SUFFIX, VERSION_FILE);
        Fixture {
            _dir: dir,
            store,
            host,
            orchestrator,
        }
    }

    /// A release `cf_days`/`rd_days` away from `now`.
    fn seed(store: &RedbStore, now: DateTime<Utc>, cf_days: i64, rd_days: i64) -> Release {
        let r = Release::new(
            "M130",
            "ops",
            now + Duration::days(cf_days),
            now + Duration::days(rd_days),
            "releases/M130",
            "https://github.com/o/r/tree/releases/M130",
        );
        store.insert_release(&r).unwrap();
        r
    }

    #[tokio::test]
    async fn scheduled_release_only_updates_state() {
        let f = fixture(FakeHost::healthy());
        let now = Utc::now();
        let r = seed(&f.store, now, 10, 17);

        let out = f.orchestrator.sync_at(&r.id, now).await.unwrap();
        assert!(!out.fetched);
        assert_eq!(out.release.state, ReleaseState::Scheduled);
        assert_eq!(f.host.calls.load(Ordering::SeqCst), 0);
        assert!(f.store.list_libraries(&r.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn code_freeze_sync_persists_reconciled_data() {
        let f = fixture(FakeHost::healthy());
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);

        let out = f.orchestrator.sync_at(&r.id, now).await.unwrap();
        assert!(out.fetched);
        assert_eq!(out.release.state, ReleaseState::CodeFreeze);
        assert_eq!(out.release.build_artifact.job_id, Some(7));

        let libs = f.store.list_libraries(&r.id).unwrap();
        let names: Vec<&str> = libs.iter().map(|l| l.library_name.as_str()).collect();
        assert_eq!(names, vec!["firebase-abt", "firebase-common", "firebase-firestore"]);

        let abt = &libs[0];
        assert!(abt.opted_out);
        assert!(!abt.library_group_release);
        let firestore = &libs[2];
        assert_eq!(firestore.updated_version, "24.0.0");
        assert!(!firestore.opted_in && !firestore.opted_out);

        let changes = f.store.list_changes(&r.id).unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .any(|c| c.commit_id == "c2" && c.library_id == firestore.id));
        assert_eq!(f.store.list_check_runs(&r.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_sync_is_idempotent() {
        let f = fixture(FakeHost::healthy());
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);

        f.orchestrator.sync_at(&r.id, now).await.unwrap();
        let libs1 = f.store.list_libraries(&r.id).unwrap();
        let changes1 = f.store.list_changes(&r.id).unwrap();
        let checks1 = f.store.list_check_runs(&r.id).unwrap();

        f.orchestrator.sync_at(&r.id, now).await.unwrap();
        assert_eq!(f.store.list_libraries(&r.id).unwrap(), libs1);
        assert_eq!(f.store.list_changes(&r.id).unwrap(), changes1);
        assert_eq!(f.store.list_check_runs(&r.id).unwrap(), checks1);
    }

    #[tokio::test]
    async fn malformed_manifest_moves_release_to_error_once() {
        let mut host = FakeHost::healthy();
        host.manifest = r#"{"libs": ["oops"]}"#.into();
        let f = fixture(host);
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);

        let err = f.orchestrator.sync_at(&r.id, now).await.unwrap_err();
        assert!(matches!(err, RelsyncError::MalformedManifest(_)));
        assert_eq!(f.store.get_release(&r.id).unwrap().state, ReleaseState::Error);

        let errors = f.store.list_errors(&r.id).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].release_id, r.id);
        assert!(errors[0].context_msg.contains("manifest"));
        assert!(f.store.list_libraries(&r.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn successful_sync_clears_error_state() {
        let mut broken = FakeHost::healthy();
        broken.workflow = None;
        let f = fixture(broken);
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);
        assert!(matches!(
            f.orchestrator.sync_at(&r.id, now).await,
            Err(RelsyncError::WorkflowNotFound { .. })
        ));
        assert_eq!(f.store.get_release(&r.id).unwrap().state, ReleaseState::Error);

        let healthy = SyncOrchestrator::new(
            f.store.clone(),
            Arc::new(FakeHost::healthy()),
            SUFFIX,
            VERSION_FILE,
        );
        let out = healthy.sync_at(&r.id, now).await.unwrap();
        assert_eq!(out.release.state, ReleaseState::CodeFreeze);
        assert_eq!(f.store.list_errors(&r.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_branch_before_code_freeze_is_not_an_error() {
        let mut host = FakeHost::healthy();
        host.branch = false;
        let f = fixture(host);
        let now = Utc::now();
        let r = seed(&f.store, now, 2, 9);

        let out = f.orchestrator.sync_at(&r.id, now).await.unwrap();
        assert!(!out.fetched);
        assert_eq!(out.release.state, ReleaseState::CodeFreeze);
        assert!(f.store.list_errors(&r.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_branch_after_code_freeze_is_an_error() {
        let mut host = FakeHost::healthy();
        host.branch = false;
        let f = fixture(host);
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);

        let err = f.orchestrator.sync_at(&r.id, now).await.unwrap_err();
        assert!(matches!(err, RelsyncError::BranchMissing(_)));
        assert_eq!(f.store.get_release(&r.id).unwrap().state, ReleaseState::Error);
        assert_eq!(f.store.list_errors(&r.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_version_line_fails_the_sync() {
        let mut host = FakeHost::healthy();
        host.versions
            .insert("firebase-common/gradle.properties".into(), "# nothing\n".into());
        let f = fixture(host);
        let now = Utc::now();
        let r = seed(&f.store, now, -1, 5);

        let err = f.orchestrator.sync_at(&r.id, now).await.unwrap_err();
        assert!(matches!(err, RelsyncError::VersionNotFound));
        let errors = f.store.list_errors(&r.id).unwrap();
        assert!(errors[0].context_msg.contains("firebase-common"));
    }

    #[tokio::test]
    async fn unknown_release_is_not_recorded() {
        let f = fixture(FakeHost::healthy());
        assert!(matches!(
            f.orchestrator.sync("missing").await,
            Err(RelsyncError::ReleaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_sync_of_same_release_is_rejected() {
        let f = fixture(FakeHost::healthy());
        let now = Utc::now();
        let r = seed(&f.store, now, 10, 17);

        let held = f.orchestrator.try_lease(&r.id).unwrap();
        assert!(matches!(
            f.orchestrator.sync_at(&r.id, now).await,
            Err(RelsyncError::SyncInProgress(_))
        ));
        drop(held);
        assert!(f.orchestrator.sync_at(&r.id, now).await.is_ok());
    }

    /// Delegates to redb and notes the thread of every call.
    struct ThreadLog {
        inner: RedbStore,
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl ThreadLog {
        fn note(&self) {
            self.threads.lock().unwrap().push(std::thread::current().id());
        }
    }

    impl ReleaseStore for ThreadLog {
        fn insert_release(&self, release: &Release) -> Result<()> {
            self.inner.insert_release(release)
        }
        fn get_release(&self, id: &str) -> Result<Release> {
            self.note();
            self.inner.get_release(id)
        }
        fn get_release_by_name(&self, name: &str) -> Result<Option<String>> {
            self.inner.get_release_by_name(name)
        }
        fn find_release_by_branch(&self, branch: &str) -> Result<Option<Release>> {
            self.inner.find_release_by_branch(branch)
        }
        fn list_releases(&self) -> Result<Vec<Release>> {
            self.inner.list_releases()
        }
        fn replace_libraries(
            &self,
            release_id: &str,
            libraries: &BTreeMap<String, LibraryMeta>,
        ) -> Result<Vec<Library>> {
            self.inner.replace_libraries(release_id, libraries)
        }
        fn replace_changes(
            &self,
            release_id: &str,
            changes: &BTreeMap<String, Vec<HostChange>>,
        ) -> Result<Vec<Change>> {
            self.inner.replace_changes(release_id, changes)
        }
        fn replace_check_runs(
            &self,
            release_id: &str,
            runs: &[CheckRun],
        ) -> Result<()> {
            self.inner.replace_check_runs(release_id, runs)
        }
        fn update_release(&self, id: &str, patch: &ReleasePatch) -> Result<Release> {
            self.note();
            self.inner.update_release(id, patch)
        }
        fn delete_release_cascade(&self, id: &str) -> Result<()> {
            self.inner.delete_release_cascade(id)
        }
        fn record_error(
            &self,
            release_id: &str,
            message: &str,
            stack_trace: &str,
            context_msg: &str,
        ) -> Result<ReleaseError> {
            self.note();
            self.inner
                .record_error(release_id, message, stack_trace, context_msg)
        }
        fn list_libraries(&self, release_id: &str) -> Result<Vec<Library>> {
            self.inner.list_libraries(release_id)
        }
        fn list_changes(&self, release_id: &str) -> Result<Vec<Change>> {
            self.inner.list_changes(release_id)
        }
        fn list_check_runs(&self, release_id: &str) -> Result<Vec<CheckRun>> {
            self.inner.list_check_runs(release_id)
        }
        fn list_errors(&self, release_id: &str) -> Result<Vec<ReleaseError>> {
            self.inner.list_errors(release_id)
        }
        fn apply_sync(&self, write: &SyncWrite) -> Result<Release> {
            self.note();
            self.inner.apply_sync(write)
        }
    }

    #[tokio::test]
    async fn store_calls_run_off_the_async_thread() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ThreadLog {
            inner: RedbStore::open(&dir.path().join("sync.redb")).unwrap(),
            threads: Mutex::new(Vec::new()),
        });
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            Arc::new(FakeHost::healthy()),
            SUFFIX,
            VERSION_FILE,
        );
        let now = Utc::now();
        let ok = seed(&store.inner, now, -1, 5);
        orchestrator.sync_at(&ok.id, now).await.unwrap();

        let broken = Release::new(
            "M131",
            "ops",
            now - Duration::days(1),
            now + Duration::days(5),
            "releases/M131",
            "",
        );
        store.inner.insert_release(&broken).unwrap();
        let failing = SyncOrchestrator::new(
            store.clone(),
            Arc::new(FakeHost {
                manifest: "{".into(),
                ..FakeHost::healthy()
            }),
            SUFFIX,
            VERSION_FILE,
        );
        assert!(failing.sync_at(&broken.id, now).await.is_err());

        // The current-thread runtime polls on this thread; store work must not.
        let here = std::thread::current().id();
        let threads = store.threads.lock().unwrap();
        assert!(threads.len() >= 5, "{} store calls seen", threads.len());
        assert!(threads.iter().all(|t| *t != here));
    }

    #[test]
    fn resolve_accepts_id_or_name() {
        let f = fixture(FakeHost::healthy());
        let r = seed(&f.store, Utc::now(), 10, 17);
        assert_eq!(f.orchestrator.resolve(&r.id).unwrap(), r.id);
        assert_eq!(f.orchestrator.resolve("M130").unwrap(), r.id);
        assert!(matches!(
            f.orchestrator.resolve("M999"),
            Err(RelsyncError::ReleaseNotFound(_))
        ));
    }
}
