//! The per-account upload scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use shoebox_core::config::media::MediaConfig;
use shoebox_core::config::uploader::UploaderConfig;
use shoebox_core::result::AppResult;
use shoebox_core::traits::{
    ActivitySink, AssetResolver, BackgroundExecution, BackgroundGrant, MediaExporter,
    SessionProvider,
};
use shoebox_core::types::id::{AccountId, AssetId};
use shoebox_core::types::media::ExportPreferences;
use shoebox_entity::{RunnerLease, UploadQueueState};
use shoebox_store::QueueStore;

use crate::activity::UploadActivity;
use crate::operation::{CancelFlag, UploadContext, UploadOperation, UploadTaskError};

/// Result of the atomic inspect-and-acquire step.
enum RunDecision {
    /// Nothing queued.
    Empty,
    /// Another runner holds a valid lease.
    Busy,
    /// We hold the lease now.
    Acquired,
}

/// State of one in-progress run, kept so `cancel_all` and same-process
/// liveness checks can reach it.
struct ActiveRun {
    activity: Arc<UploadActivity>,
    cancel: CancelFlag,
}

/// Everything one drain task needs, fixed at acquisition time.
struct RunContext {
    account: AccountId,
    lease_token: Uuid,
    generation_at_entry: u64,
    /// Queue snapshot taken atomically with the lease acquisition; entries
    /// added later are picked up by a follow-up pass.
    state: UploadQueueState,
    activity: Arc<UploadActivity>,
    cancel: CancelFlag,
}

struct SchedulerInner {
    store: QueueStore,
    sessions: Arc<dyn SessionProvider>,
    assets: Arc<dyn AssetResolver>,
    exporter: Arc<dyn MediaExporter>,
    background: Arc<dyn BackgroundExecution>,
    sink: Arc<dyn ActivitySink>,
    config: UploaderConfig,
    prefs: ExportPreferences,
    /// Bumped on every enqueue; a run compares its entry snapshot against
    /// the current value to detect work that arrived while it was draining.
    generations: DashMap<AccountId, u64>,
    /// Serializes lease acquisition per account within this process.
    gates: DashMap<AccountId, Arc<Mutex<()>>>,
    /// Runs currently draining, keyed by account.
    active: DashMap<AccountId, ActiveRun>,
}

/// Drains each account's durable upload queue with a bounded worker pool,
/// enforcing "at most one active runner per account" across all cooperating
/// processes via the lease stored in the queue record.
///
/// Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct UploadScheduler {
    inner: Arc<SchedulerInner>,
    process_id: Arc<str>,
}

impl std::fmt::Debug for UploadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadScheduler")
            .field("process_id", &self.process_id)
            .finish()
    }
}

impl UploadScheduler {
    /// Create a scheduler for this process.
    pub fn new(
        store: QueueStore,
        sessions: Arc<dyn SessionProvider>,
        assets: Arc<dyn AssetResolver>,
        exporter: Arc<dyn MediaExporter>,
        background: Arc<dyn BackgroundExecution>,
        sink: Arc<dyn ActivitySink>,
        config: UploaderConfig,
        media: &MediaConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                sessions,
                assets,
                exporter,
                background,
                sink,
                config,
                prefs: media.export_preferences(),
                generations: DashMap::new(),
                gates: DashMap::new(),
                active: DashMap::new(),
            }),
            process_id: Arc::from(format!("pid:{}", std::process::id())),
        }
    }

    /// Override the process identifier recorded in leases. Useful for
    /// embedders running several independent schedulers (host app and
    /// extensions) and for tests simulating multiple processes. Call before
    /// sharing the scheduler.
    pub fn with_process_id(mut self, process_id: impl Into<String>) -> Self {
        self.process_id = Arc::from(process_id.into());
        self
    }

    /// The durable store this scheduler drains.
    pub fn store(&self) -> &QueueStore {
        &self.inner.store
    }

    // ── Public interface ─────────────────────────────────────────

    /// Queue uploads for `asset_ids` into `target_path` and kick off a
    /// scheduling pass. Returns as soon as the jobs are durable; outcomes
    /// are observable only through the activity sink and the queue itself.
    pub async fn enqueue(
        &self,
        account: &AccountId,
        asset_ids: &[AssetId],
        target_path: &str,
    ) -> AppResult<()> {
        self.inner
            .store
            .add_jobs(account, asset_ids, target_path)
            .await?;
        self.bump_generation(account);
        self.run_if_needed(account).await
    }

    /// Start draining the account's queue unless it is empty or another
    /// runner already owns it. Returns once the drain task is spawned; the
    /// drain itself proceeds in the background.
    pub fn run_if_needed<'a>(
        &'a self,
        account: &'a AccountId,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = AppResult<()>> + Send + 'a>> {
        Box::pin(async move {
        let gate = self
            .inner
            .gates
            .entry(*account)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _acquiring = gate.lock().await;

        let generation_at_entry = self.generation(account);
        let token = Uuid::new_v4();
        let process_id = self.process_id.to_string();
        let ttl = self.inner.config.lease_ttl_seconds;
        // Thorough same-process check: a lease this process minted with no
        // run behind it means an earlier run crashed or panicked.
        let has_active_run = self.inner.active.contains_key(account);

        let (state, decision) = self
            .inner
            .store
            .mutate_with(account, |state| {
                if state.job_count() == 0 {
                    return RunDecision::Empty;
                }
                if let Some(lease) = &state.lease {
                    let stale = lease.is_expired(Utc::now())
                        || (lease.process_id == process_id && !has_active_run);
                    if !stale {
                        return RunDecision::Busy;
                    }
                    tracing::warn!(
                        "Taking over stale upload lease for account {} (was held by {})",
                        account,
                        lease.process_id
                    );
                }
                state.lease = Some(RunnerLease::new(token, process_id.clone(), Utc::now(), ttl));
                RunDecision::Acquired
            })
            .await?;

        match decision {
            RunDecision::Empty => {
                tracing::trace!("No uploads queued for account {}", account);
                Ok(())
            }
            RunDecision::Busy => {
                tracing::debug!(
                    "Upload queue for account {} is already being drained elsewhere",
                    account
                );
                Ok(())
            }
            RunDecision::Acquired => {
                let activity = Arc::new(UploadActivity::new(state.job_count()));
                let cancel = CancelFlag::default();
                self.inner.active.insert(
                    *account,
                    ActiveRun {
                        activity: Arc::clone(&activity),
                        cancel: cancel.clone(),
                    },
                );

                let run = RunContext {
                    account: *account,
                    lease_token: token,
                    generation_at_entry,
                    state,
                    activity,
                    cancel,
                };
                let this = self.clone();
                tokio::spawn(async move { this.drain(run).await });
                Ok(())
            }
        }
        })
    }

    /// Abandon everything queued for the account: cancels the active run
    /// (if any) and clears the whole queue record.
    pub async fn cancel_all(&self, account: &AccountId) -> AppResult<()> {
        if let Some(run) = self.inner.active.get(account) {
            tracing::info!("Cancelling active upload run for account {}", account);
            run.activity.cancel();
            run.cancel.cancel();
        }
        self.inner.store.clear_jobs(account).await?;
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────

    fn generation(&self, account: &AccountId) -> u64 {
        self.inner
            .generations
            .get(account)
            .map(|g| *g)
            .unwrap_or(0)
    }

    fn bump_generation(&self, account: &AccountId) {
        *self.inner.generations.entry(*account).or_insert(0) += 1;
    }

    /// Drive one scheduling run to completion and finalize it.
    async fn drain(self, run: RunContext) {
        let mut session_opened = false;
        let mut grant = None;

        if let Err(e) = self
            .drain_inner(&run, &mut session_opened, &mut grant)
            .await
        {
            tracing::error!("Upload run for account {} aborted: {}", run.account, e);
        }

        if let Some(grant) = grant.take() {
            grant.end().await;
        }

        self.finalize(&run, session_opened).await;
    }

    async fn drain_inner(
        &self,
        run: &RunContext,
        session_opened: &mut bool,
        grant_slot: &mut Option<Box<dyn BackgroundGrant>>,
    ) -> AppResult<()> {
        let session = self.inner.sessions.request_session(&run.account).await?;
        *session_opened = true;

        // Keep running while the host app is suspended; revocation aborts
        // the run but leaves jobs queued, exactly like a crash would.
        let expire_cancel = run.cancel.clone();
        let grant = self
            .inner
            .background
            .begin(
                "shoebox-upload-run",
                Box::new(move || {
                    tracing::warn!("Background grant expired, aborting upload run");
                    expire_cancel.cancel();
                }),
            )
            .await?;
        *grant_slot = Some(grant);

        self.inner.sink.published(&run.activity.snapshot());

        let heartbeat = self.spawn_lease_heartbeat(run.account, run.lease_token, run.cancel.clone());

        let concurrency = self.inner.config.effective_concurrency();
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut operations: JoinSet<()> = JoinSet::new();

        tracing::info!(
            "Draining {} upload jobs for account {} (concurrency {})",
            run.state.job_count(),
            run.account,
            concurrency
        );

        let ctx = Arc::new(UploadContext {
            account: run.account,
            store: self.inner.store.clone(),
            session,
            assets: Arc::clone(&self.inner.assets),
            exporter: Arc::clone(&self.inner.exporter),
            prefs: self.inner.prefs.clone(),
        });

        'dispatch: for asset_id in &run.state.queue {
            let Some(jobs) = run.state.jobs.get(asset_id) else {
                continue;
            };
            for job in jobs {
                // User cancellation or grant expiry: stop handing out work.
                if run.cancel.is_cancelled() || run.activity.is_cancelled() {
                    break 'dispatch;
                }

                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break 'dispatch;
                };

                let operation =
                    UploadOperation::new(Arc::clone(&ctx), asset_id.clone(), job.clone());
                let cancel = run.cancel.clone();
                let asset_id = asset_id.clone();
                operations.spawn(async move {
                    let _permit = permit;
                    match operation.execute(&cancel).await {
                        Ok(outcome) => {
                            tracing::debug!("Upload of asset {} finished: {:?}", asset_id, outcome);
                        }
                        Err(UploadTaskError::Transient(msg)) => {
                            tracing::warn!(
                                "Upload of asset {} will be retried on a later pass: {}",
                                asset_id,
                                msg
                            );
                        }
                        Err(UploadTaskError::Internal(e)) => {
                            tracing::error!(
                                "Upload of asset {} hit an internal error: {}",
                                asset_id,
                                e
                            );
                        }
                    }
                });
            }
        }

        while let Some(joined) = operations.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Upload operation task failed: {}", e);
            }
            run.activity.record_finished_upload();
            self.inner.sink.updated(&run.activity.snapshot());
        }

        heartbeat.abort();
        Ok(())
    }

    /// Periodically extend the lease while the run is alive. Losing the
    /// lease (another process reclaimed it after an expiry) aborts the run
    /// to keep a single active runner.
    fn spawn_lease_heartbeat(
        &self,
        account: AccountId,
        token: Uuid,
        cancel: CancelFlag,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.inner.store.clone();
        let ttl = self.inner.config.lease_ttl_seconds;
        let period = Duration::from_secs((ttl / 3).max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.refresh_lease(&account, token, ttl).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(
                            "Lost the upload lease for account {}, aborting run",
                            account
                        );
                        cancel.cancel();
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to refresh upload lease for account {}: {}",
                            account,
                            e
                        );
                    }
                }
            }
        })
    }

    /// Steps shared by every run ending: clear on cancellation, unpublish,
    /// hand the session back, release the lease, and re-run when new work
    /// arrived after the snapshot.
    async fn finalize(&self, run: &RunContext, session_opened: bool) {
        if run.activity.is_cancelled() {
            // Cancellation abandons everything, not just in-flight jobs.
            if let Err(e) = self.inner.store.clear_jobs(&run.account).await {
                tracing::error!(
                    "Failed to clear upload queue for account {} after cancellation: {}",
                    run.account,
                    e
                );
            }
        }

        self.inner.sink.unpublished(&run.activity.snapshot());

        if session_opened {
            self.inner.sessions.return_session(&run.account).await;
        }

        if let Err(e) = self
            .inner
            .store
            .release_lease(&run.account, run.lease_token)
            .await
        {
            tracing::error!(
                "Failed to release upload lease for account {}: {}",
                run.account,
                e
            );
        }

        self.inner.active.remove(&run.account);

        // New jobs enqueued after the snapshot are not covered by this run;
        // start another pass so nothing is silently left behind.
        if self.generation(&run.account) != run.generation_at_entry {
            tracing::debug!(
                "Upload queue for account {} changed during the run, scheduling again",
                run.account
            );
            let this = self.clone();
            let account = run.account;
            tokio::spawn(async move {
                if let Err(e) = this.run_if_needed(&account).await {
                    tracing::error!(
                        "Follow-up scheduling pass for account {} failed: {}",
                        account,
                        e
                    );
                }
            });
        }
    }
}
