//! Scheduler and operation tests against fake collaborators and a real
//! on-disk store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use shoebox_core::config::media::MediaConfig;
use shoebox_core::config::sweep::SweepConfig;
use shoebox_core::config::uploader::UploaderConfig;
use shoebox_core::result::AppResult;
use shoebox_core::traits::background::ExpirationHandler;
use shoebox_core::traits::{
    AccountSession, ActivitySink, AssetResolver, BackgroundExecution, BackgroundGrant,
    MediaExporter, SessionProvider, UnboundedExecution,
};
use shoebox_core::types::activity::UploadActivityInfo;
use shoebox_core::types::id::{AccountId, AssetId, TrackingId};
use shoebox_core::types::media::{ExportPreferences, ExportedMedia, MediaAsset, MediaKind};
use shoebox_core::types::remote::{ImportHandle, ImportRequest, RemoteItem};
use shoebox_entity::{RunnerLease, UploadJob};
use shoebox_store::QueueStore;
use shoebox_uploader::{
    CancelFlag, InstantUploadScan, UploadContext, UploadOperation, UploadOutcome, UploadScheduler,
    UploadSweeper,
};

// ── Fake collaborators ───────────────────────────────────────────

/// Remote backend fake. Imports create a placeholder immediately; the
/// transfer completes once a permit is released through `release`.
struct FakeSession {
    /// tracking id -> is_placeholder
    tracked: Arc<Mutex<HashMap<String, bool>>>,
    /// resolvable destination folders by path
    destinations: Mutex<HashMap<String, RemoteItem>>,
    imports: AtomicUsize,
    next_tracking: AtomicUsize,
    gate: Arc<tokio::sync::Semaphore>,
}

impl FakeSession {
    fn new(open_gate: bool) -> Arc<Self> {
        let session = Arc::new(Self {
            tracked: Arc::new(Mutex::new(HashMap::new())),
            destinations: Mutex::new(HashMap::new()),
            imports: AtomicUsize::new(0),
            next_tracking: AtomicUsize::new(0),
            gate: Arc::new(tokio::sync::Semaphore::new(if open_gate { 10_000 } else { 0 })),
        });
        session.add_destination("/Photos");
        session
    }

    fn add_destination(&self, path: &str) {
        self.destinations.lock().unwrap().insert(
            path.to_string(),
            RemoteItem {
                path: path.to_string(),
                tracking_id: TrackingId::from(format!("dir:{path}").as_str()),
                is_placeholder: false,
            },
        );
    }

    /// Let `n` pending transfers finish.
    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    /// Record a tracking id as the backend would after a finished (or still
    /// in-flight) transfer from an earlier process lifetime.
    fn seed_tracked(&self, id: &str, is_placeholder: bool) {
        self.tracked
            .lock()
            .unwrap()
            .insert(id.to_string(), is_placeholder);
    }
}

#[async_trait]
impl AccountSession for FakeSession {
    async fn resolve_item(&self, path: &str) -> AppResult<Option<RemoteItem>> {
        Ok(self.destinations.lock().unwrap().get(path).cloned())
    }

    async fn import_file(&self, _request: ImportRequest) -> AppResult<ImportHandle> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        let id = format!("t-{}", self.next_tracking.fetch_add(1, Ordering::SeqCst));
        self.tracked.lock().unwrap().insert(id.clone(), true);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let gate = Arc::clone(&self.gate);
        let tracked = Arc::clone(&self.tracked);
        let task_id = id.clone();
        tokio::spawn(async move {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
            tracked.lock().unwrap().insert(task_id, false);
            let _ = tx.send(Ok(()));
        });

        Ok(ImportHandle {
            tracking_id: TrackingId::from(id.as_str()),
            completion: rx,
        })
    }

    async fn lookup_tracked_item(&self, id: &TrackingId) -> AppResult<Option<RemoteItem>> {
        Ok(self
            .tracked
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(|&is_placeholder| RemoteItem {
                path: format!("/remote/{id}"),
                tracking_id: id.clone(),
                is_placeholder,
            }))
    }
}

struct FakeSessionProvider {
    session: Arc<FakeSession>,
    open: AtomicUsize,
}

impl FakeSessionProvider {
    fn new(session: Arc<FakeSession>) -> Arc<Self> {
        Arc::new(Self {
            session,
            open: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn request_session(&self, _account: &AccountId) -> AppResult<Arc<dyn AccountSession>> {
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.session) as Arc<dyn AccountSession>)
    }

    async fn return_session(&self, _account: &AccountId) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakeAssets {
    assets: Mutex<Vec<MediaAsset>>,
}

impl FakeAssets {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            assets: Mutex::new(Vec::new()),
        })
    }

    fn add(&self, id: &str, kind: MediaKind, created_at: DateTime<Utc>) {
        self.assets.lock().unwrap().push(MediaAsset {
            id: AssetId::from(id),
            name: format!("{id}.bin"),
            kind,
            created_at,
        });
    }
}

#[async_trait]
impl AssetResolver for FakeAssets {
    async fn resolve_asset(&self, id: &AssetId) -> AppResult<Option<MediaAsset>> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.id == id)
            .cloned())
    }

    async fn assets_created_after(
        &self,
        after: DateTime<Utc>,
        kinds: &[MediaKind],
    ) -> AppResult<Vec<MediaAsset>> {
        let mut found: Vec<MediaAsset> = self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.created_at > after && kinds.contains(&a.kind))
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }
}

struct FakeExporter {
    exports: AtomicUsize,
}

impl FakeExporter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            exports: AtomicUsize::new(0),
        })
    }

    fn export_count(&self) -> usize {
        self.exports.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaExporter for FakeExporter {
    async fn export(
        &self,
        asset: &MediaAsset,
        _prefs: &ExportPreferences,
    ) -> AppResult<ExportedMedia> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        Ok(ExportedMedia {
            name: asset.name.clone(),
            source: PathBuf::from(format!("/tmp/export/{}", asset.name)),
        })
    }
}

/// Background-execution fake whose grants can be revoked from the test.
#[derive(Default)]
struct FakeBackground {
    handlers: Mutex<Vec<ExpirationHandler>>,
}

impl FakeBackground {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Revoke every outstanding grant.
    fn expire_all(&self) {
        let handlers: Vec<_> = self.handlers.lock().unwrap().drain(..).collect();
        for handler in handlers {
            handler();
        }
    }
}

#[async_trait]
impl BackgroundExecution for FakeBackground {
    async fn begin(
        &self,
        _name: &str,
        on_expire: ExpirationHandler,
    ) -> AppResult<Box<dyn BackgroundGrant>> {
        self.handlers.lock().unwrap().push(on_expire);
        Ok(Box::new(FakeGrant))
    }
}

struct FakeGrant;

#[async_trait]
impl BackgroundGrant for FakeGrant {
    async fn end(self: Box<Self>) {}
}

#[derive(Debug, Clone)]
enum SinkEvent {
    Published(UploadActivityInfo),
    Updated(UploadActivityInfo),
    Unpublished(UploadActivityInfo),
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn published_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Published(_)))
            .count()
    }

    fn unpublished(&self) -> Vec<UploadActivityInfo> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Unpublished(info) => Some(info.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ActivitySink for RecordingSink {
    fn published(&self, activity: &UploadActivityInfo) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Published(activity.clone()));
    }

    fn updated(&self, activity: &UploadActivityInfo) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Updated(activity.clone()));
    }

    fn unpublished(&self, activity: &UploadActivityInfo) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Unpublished(activity.clone()));
    }
}

// ── Harness ──────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    store: QueueStore,
    session: Arc<FakeSession>,
    assets: Arc<FakeAssets>,
    exporter: Arc<FakeExporter>,
    sink: Arc<RecordingSink>,
    scheduler: UploadScheduler,
}

impl Harness {
    async fn new(concurrency: usize, open_gate: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let store = QueueStore::open(dir.path().join("queues.db"), Duration::from_secs(5))
            .await
            .unwrap();

        let session = FakeSession::new(open_gate);
        let assets = FakeAssets::new();
        let exporter = FakeExporter::new();
        let sink = RecordingSink::new();

        let scheduler = Self::build_scheduler(
            &store,
            &session,
            &assets,
            &exporter,
            &sink,
            concurrency,
            "proc-main",
        );

        Self {
            _dir: dir,
            store,
            session,
            assets,
            exporter,
            sink,
            scheduler,
        }
    }

    /// A second scheduler over the same store, standing in for another
    /// process with its own sink.
    fn sibling(&self, process_id: &str, sink: &Arc<RecordingSink>) -> UploadScheduler {
        Self::build_scheduler(
            &self.store,
            &self.session,
            &self.assets,
            &self.exporter,
            sink,
            1,
            process_id,
        )
    }

    /// Same fakes, but with a revocable background-execution provider.
    fn scheduler_with_background(&self, background: Arc<dyn BackgroundExecution>) -> UploadScheduler {
        UploadScheduler::new(
            self.store.clone(),
            FakeSessionProvider::new(Arc::clone(&self.session)),
            Arc::clone(&self.assets) as Arc<dyn AssetResolver>,
            Arc::clone(&self.exporter) as Arc<dyn MediaExporter>,
            background,
            Arc::clone(&self.sink) as Arc<dyn ActivitySink>,
            UploaderConfig {
                concurrency: 1,
                lease_ttl_seconds: 60,
            },
            &MediaConfig::default(),
        )
        .with_process_id("proc-main")
    }

    fn build_scheduler(
        store: &QueueStore,
        session: &Arc<FakeSession>,
        assets: &Arc<FakeAssets>,
        exporter: &Arc<FakeExporter>,
        sink: &Arc<RecordingSink>,
        concurrency: usize,
        process_id: &str,
    ) -> UploadScheduler {
        UploadScheduler::new(
            store.clone(),
            FakeSessionProvider::new(Arc::clone(session)),
            Arc::clone(assets) as Arc<dyn AssetResolver>,
            Arc::clone(exporter) as Arc<dyn MediaExporter>,
            Arc::new(UnboundedExecution),
            Arc::clone(sink) as Arc<dyn ActivitySink>,
            UploaderConfig {
                concurrency,
                lease_ttl_seconds: 60,
            },
            &MediaConfig::default(),
        )
        .with_process_id(process_id)
    }

    fn upload_context(&self) -> (AccountId, Arc<UploadContext>) {
        let account = AccountId::new();
        let ctx = Arc::new(UploadContext {
            account,
            store: self.store.clone(),
            session: Arc::clone(&self.session) as Arc<dyn AccountSession>,
            assets: Arc::clone(&self.assets) as Arc<dyn AssetResolver>,
            exporter: Arc::clone(&self.exporter) as Arc<dyn MediaExporter>,
            prefs: ExportPreferences::default(),
        });
        (account, ctx)
    }
}

async fn wait_for<F, Fut>(what: &str, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn asset_ids(ids: &[&str]) -> Vec<AssetId> {
    ids.iter().map(|id| AssetId::from(*id)).collect()
}

// ── Scheduler scenarios ──────────────────────────────────────────

/// Three assets, pool of one: everything drains, the activity reports 3/3
/// before being unpublished.
#[tokio::test]
async fn drains_three_assets_with_pool_of_one() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();
    let now = Utc::now();
    h.assets.add("a1", MediaKind::Photo, now);
    h.assets.add("a2", MediaKind::Photo, now);
    h.assets.add("a3", MediaKind::Video, now);

    h.scheduler
        .enqueue(&account, &asset_ids(&["a1", "a2", "a3"]), "/Photos")
        .await
        .unwrap();
    assert!(h.store.job_count(&account).await.unwrap() <= 3);

    wait_for("queue to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0 && !h.sink.unpublished().is_empty()
    })
    .await;

    let ended = h.sink.unpublished();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].total, 3);
    assert_eq!(ended[0].completed, 3);
    assert!(!ended[0].cancelled);
    assert_eq!(h.exporter.export_count(), 3);
    assert_eq!(h.session.import_count(), 3);

    // The lease is gone once the run ends.
    let state = h.store.read(&account).await.unwrap().unwrap();
    assert!(state.lease.is_none());
}

/// Enqueueing while a run is draining triggers a follow-up pass that picks
/// up the late job.
#[tokio::test]
async fn late_enqueue_is_drained_by_follow_up_pass() {
    let h = Harness::new(1, false).await;
    let h = &h;
    let account = AccountId::new();
    let now = Utc::now();
    h.assets.add("a1", MediaKind::Photo, now);
    h.assets.add("a2", MediaKind::Photo, now);

    h.scheduler
        .enqueue(&account, &asset_ids(&["a1"]), "/Photos")
        .await
        .unwrap();

    // The first operation is mid-transfer; its run snapshot predates a2.
    wait_for("first import to start", || async move {
        h.session.import_count() == 1
    })
    .await;

    h.scheduler
        .enqueue(&account, &asset_ids(&["a2"]), "/Photos")
        .await
        .unwrap();
    assert_eq!(h.store.job_count(&account).await.unwrap(), 2);

    h.session.release(10);

    wait_for("both passes to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;

    wait_for("second run to end", || async move {
        h.sink.unpublished().len() == 2
    })
    .await;
    assert_eq!(h.sink.published_count(), 2);
    assert_eq!(h.session.import_count(), 2);
}

/// Cancelling clears the whole queue, not just in-flight jobs.
#[tokio::test]
async fn cancel_all_empties_the_queue() {
    let h = Harness::new(1, false).await;
    let h = &h;
    let account = AccountId::new();
    let now = Utc::now();
    h.assets.add("a1", MediaKind::Photo, now);
    h.assets.add("a2", MediaKind::Photo, now);
    h.assets.add("a3", MediaKind::Photo, now);

    h.scheduler
        .enqueue(&account, &asset_ids(&["a1", "a2", "a3"]), "/Photos")
        .await
        .unwrap();
    wait_for("first import to start", || async move {
        h.session.import_count() >= 1
    })
    .await;

    h.scheduler.cancel_all(&account).await.unwrap();
    h.session.release(10);

    wait_for("run to end cancelled", || async move {
        !h.sink.unpublished().is_empty()
    })
    .await;

    assert_eq!(h.store.job_count(&account).await.unwrap(), 0);
    let ended = h.sink.unpublished();
    assert!(ended[0].cancelled);
    // Only the in-flight operation ever reached the backend.
    assert!(h.session.import_count() < 3);
}

/// Cancelling with no active run still abandons everything queued.
#[tokio::test]
async fn cancel_all_without_active_run_clears_store() {
    let h = Harness::new(1, true).await;
    let account = AccountId::new();

    // Queued by hand so no run starts.
    h.store
        .add_job(&account, &AssetId::from("a1"), "/Photos")
        .await
        .unwrap();
    h.store
        .add_job(&account, &AssetId::from("a2"), "/Backup")
        .await
        .unwrap();

    h.scheduler.cancel_all(&account).await.unwrap();
    assert_eq!(h.store.job_count(&account).await.unwrap(), 0);
}

/// While one process holds a valid lease, a second scheduler refuses to
/// start a competing runner.
#[tokio::test]
async fn valid_foreign_lease_blocks_second_runner() {
    let h = Harness::new(1, false).await;
    let h = &h;
    let account = AccountId::new();
    h.assets.add("a1", MediaKind::Photo, Utc::now());

    h.scheduler
        .enqueue(&account, &asset_ids(&["a1"]), "/Photos")
        .await
        .unwrap();
    wait_for("run to hold the lease", || async move {
        h.session.import_count() == 1
    })
    .await;

    let sink_b = RecordingSink::new();
    let sibling = h.sibling("proc-extension", &sink_b);
    sibling.run_if_needed(&account).await.unwrap();

    // The sibling saw a valid lease and backed off.
    assert_eq!(sink_b.published_count(), 0);

    h.session.release(10);
    wait_for("original run to finish", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(sink_b.published_count(), 0);
}

/// A lease left behind by a crashed process is expired and taken over; the
/// queue drains exactly once.
#[tokio::test]
async fn expired_lease_is_taken_over() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();
    h.assets.add("a1", MediaKind::Photo, Utc::now());

    h.store
        .mutate(&account, |state| {
            state.add_job(&AssetId::from("a1"), "/Photos");
            state.lease = Some(RunnerLease::new(
                Uuid::new_v4(),
                "crashed-proc",
                Utc::now() - chrono::Duration::seconds(300),
                60,
            ));
        })
        .await
        .unwrap();

    h.scheduler.run_if_needed(&account).await.unwrap();

    wait_for("takeover run to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(h.sink.published_count(), 1);
    assert_eq!(h.session.import_count(), 1);
}

/// An unexpired lease minted by this process with no run behind it (a
/// panicked run) is reclaimed immediately.
#[tokio::test]
async fn own_orphaned_lease_is_reclaimed() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();
    h.assets.add("a1", MediaKind::Photo, Utc::now());

    h.store
        .mutate(&account, |state| {
            state.add_job(&AssetId::from("a1"), "/Photos");
            state.lease = Some(RunnerLease::new(
                Uuid::new_v4(),
                "proc-main",
                Utc::now(),
                60,
            ));
        })
        .await
        .unwrap();

    h.scheduler.run_if_needed(&account).await.unwrap();

    wait_for("reclaimed run to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(h.sink.published_count(), 1);
}

/// Restart after a crash mid-transfer: the recorded tracking id resolves to
/// a materialized item, so the job is removed without another export or
/// import.
#[tokio::test]
async fn restart_resumes_without_reupload() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();
    h.assets.add("a1", MediaKind::Photo, Utc::now());

    // State a crashed process left behind: job with a tracking id, stale
    // lease; the backend finished the transfer in the meantime.
    h.store
        .mutate(&account, |state| {
            state.add_job(&AssetId::from("a1"), "/Photos");
            state.set_tracking_id(
                &AssetId::from("a1"),
                "/Photos",
                TrackingId::from("t-crashed"),
            );
            state.lease = Some(RunnerLease::new(
                Uuid::new_v4(),
                "crashed-proc",
                Utc::now() - chrono::Duration::seconds(300),
                60,
            ));
        })
        .await
        .unwrap();
    h.session.seed_tracked("t-crashed", false);

    h.scheduler.run_if_needed(&account).await.unwrap();

    wait_for("resume run to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(h.exporter.export_count(), 0);
    assert_eq!(h.session.import_count(), 0);
}

/// Grant revocation aborts the run like a crash: in-flight work stops
/// handing out operations, but queued jobs stay for the next pass.
#[tokio::test]
async fn grant_expiry_aborts_run_but_keeps_jobs() {
    let h = Harness::new(1, false).await;
    let h = &h;
    let background = FakeBackground::new();
    let scheduler = h.scheduler_with_background(Arc::clone(&background) as _);

    let account = AccountId::new();
    let now = Utc::now();
    h.assets.add("a1", MediaKind::Photo, now);
    h.assets.add("a2", MediaKind::Photo, now);
    h.assets.add("a3", MediaKind::Photo, now);

    scheduler
        .enqueue(&account, &asset_ids(&["a1", "a2", "a3"]), "/Photos")
        .await
        .unwrap();
    wait_for("first import to start", || async move {
        h.session.import_count() == 1
    })
    .await;

    background.expire_all();
    h.session.release(10);

    wait_for("run to wind down", || async move {
        !h.sink.unpublished().is_empty()
    })
    .await;

    // The in-flight upload finished; the rest waits for a later pass.
    assert_eq!(h.session.import_count(), 1);
    assert_eq!(h.store.job_count(&account).await.unwrap(), 2);
    assert!(!h.sink.unpublished()[0].cancelled);
}

/// The periodic sweep re-drives jobs left behind with no user action.
#[tokio::test]
async fn pending_sweep_redrives_leftover_jobs() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();
    h.assets.add("a1", MediaKind::Photo, Utc::now());

    // A job a crashed process never got to; nothing schedules it directly.
    h.store
        .add_job(&account, &AssetId::from("a1"), "/Photos")
        .await
        .unwrap();

    let config = SweepConfig {
        enabled: true,
        pending_schedule: "* * * * * *".to_string(),
        instant_schedule: "* * * * * *".to_string(),
    };
    let mut sweeper = UploadSweeper::new(h.scheduler.clone(), None, config)
        .await
        .unwrap();
    sweeper.register_default_tasks().await.unwrap();
    sweeper.start().await.unwrap();

    wait_for("sweep to drain the queue", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(h.session.import_count(), 1);

    sweeper.shutdown().await.unwrap();
}

// ── Operation-level behavior ─────────────────────────────────────

#[tokio::test]
async fn operation_skips_job_whose_placeholder_is_still_in_flight() {
    let h = Harness::new(1, true).await;
    let (account, ctx) = h.upload_context();

    h.store
        .add_job(&account, &AssetId::from("a1"), "/Photos")
        .await
        .unwrap();
    h.session.seed_tracked("t-busy", true);

    let job = UploadJob {
        target_path: "/Photos".to_string(),
        scheduled_tracking_id: Some(TrackingId::from("t-busy")),
    };
    let op = UploadOperation::new(ctx, AssetId::from("a1"), job);
    let outcome = op.execute(&CancelFlag::default()).await.unwrap();

    assert_eq!(outcome, UploadOutcome::UploadInFlight);
    // The concurrent attempt still owns the job.
    assert_eq!(h.store.job_count(&account).await.unwrap(), 1);
    assert_eq!(h.exporter.export_count(), 0);
}

#[tokio::test]
async fn operation_abandons_job_for_deleted_asset() {
    let h = Harness::new(1, true).await;
    let (account, ctx) = h.upload_context();

    h.store
        .add_job(&account, &AssetId::from("gone"), "/Photos")
        .await
        .unwrap();

    let op = UploadOperation::new(ctx, AssetId::from("gone"), UploadJob::new("/Photos"));
    let outcome = op.execute(&CancelFlag::default()).await.unwrap();

    assert_eq!(outcome, UploadOutcome::AssetMissing);
    assert_eq!(h.store.job_count(&account).await.unwrap(), 0);
}

#[tokio::test]
async fn operation_leaves_job_when_destination_is_unresolvable() {
    let h = Harness::new(1, true).await;
    let (account, ctx) = h.upload_context();

    h.assets.add("a1", MediaKind::Photo, Utc::now());
    h.store
        .add_job(&account, &AssetId::from("a1"), "/Nowhere")
        .await
        .unwrap();

    let op = UploadOperation::new(ctx, AssetId::from("a1"), UploadJob::new("/Nowhere"));
    let result = op.execute(&CancelFlag::default()).await;

    assert!(result.is_err());
    // Transient: retried on a later pass.
    assert_eq!(h.store.job_count(&account).await.unwrap(), 1);
}

#[tokio::test]
async fn operation_records_tracking_id_before_completion() {
    let h = Harness::new(1, false).await;
    let h = &h;
    let (account, ctx) = h.upload_context();

    h.assets.add("a1", MediaKind::Photo, Utc::now());
    h.store
        .add_job(&account, &AssetId::from("a1"), "/Photos")
        .await
        .unwrap();

    let op = UploadOperation::new(ctx, AssetId::from("a1"), UploadJob::new("/Photos"));
    let cancel = CancelFlag::default();
    let run = tokio::spawn(async move { op.execute(&cancel).await });

    // While the transfer is still pending, the tracking id is already
    // durable — this is the crash-recovery window.
    wait_for("tracking id to be recorded", || async move {
        h.store
            .read(&account)
            .await
            .unwrap()
            .and_then(|state| {
                state.jobs[&AssetId::from("a1")][0]
                    .scheduled_tracking_id
                    .clone()
            })
            .is_some()
    })
    .await;
    assert_eq!(h.store.job_count(&account).await.unwrap(), 1);

    h.session.release(1);
    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, UploadOutcome::Uploaded);
    assert_eq!(h.store.job_count(&account).await.unwrap(), 0);
}

#[tokio::test]
async fn operation_observes_cancellation_at_first_checkpoint() {
    let h = Harness::new(1, true).await;
    let (account, ctx) = h.upload_context();

    h.assets.add("a1", MediaKind::Photo, Utc::now());
    h.store
        .add_job(&account, &AssetId::from("a1"), "/Photos")
        .await
        .unwrap();

    let cancel = CancelFlag::default();
    cancel.cancel();
    let op = UploadOperation::new(ctx, AssetId::from("a1"), UploadJob::new("/Photos"));
    let outcome = op.execute(&cancel).await.unwrap();

    assert_eq!(outcome, UploadOutcome::Cancelled);
    assert_eq!(h.store.job_count(&account).await.unwrap(), 1);
    assert_eq!(h.exporter.export_count(), 0);
}

// ── Instant upload ───────────────────────────────────────────────

#[tokio::test]
async fn instant_scan_activates_then_enqueues_new_media() {
    let h = Harness::new(1, true).await;
    let h = &h;
    let account = AccountId::new();

    let config = shoebox_core::config::instant::InstantUploadConfig {
        photos: true,
        videos: false,
        target_path: "/Photos".to_string(),
    };
    let scan = InstantUploadScan::new(
        account,
        h.scheduler.clone(),
        Arc::clone(&h.assets) as Arc<dyn AssetResolver>,
        config,
    );

    // First scan only plants the watermark.
    assert_eq!(scan.scan().await.unwrap(), 0);
    let mark = h
        .store
        .upload_watermark(&account, MediaKind::Photo)
        .await
        .unwrap()
        .expect("watermark planted");

    // Captured after activation: picked up. Videos are not enabled.
    h.assets
        .add("new-photo", MediaKind::Photo, mark + chrono::Duration::seconds(5));
    h.assets
        .add("new-video", MediaKind::Video, mark + chrono::Duration::seconds(5));

    assert_eq!(scan.scan().await.unwrap(), 1);

    wait_for("instant upload to drain", || async move {
        h.store.job_count(&account).await.unwrap() == 0
    })
    .await;
    assert_eq!(h.session.import_count(), 1);

    let advanced = h
        .store
        .upload_watermark(&account, MediaKind::Photo)
        .await
        .unwrap()
        .expect("watermark kept");
    assert!(advanced > mark);

    // Nothing new: the next scan is a no-op.
    assert_eq!(scan.scan().await.unwrap(), 0);
}
