//! One unit of upload work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shoebox_core::error::AppError;
use shoebox_core::traits::{AccountSession, AssetResolver, MediaExporter};
use shoebox_core::types::id::{AccountId, AssetId};
use shoebox_core::types::media::ExportPreferences;
use shoebox_core::types::remote::ImportRequest;
use shoebox_entity::UploadJob;
use shoebox_store::QueueStore;

/// Cooperative cancellation flag shared by a run and its operations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Store handle and collaborators shared by every operation of one run.
pub struct UploadContext {
    /// Account whose queue is being drained.
    pub account: AccountId,
    /// The durable queue store.
    pub store: QueueStore,
    /// Session to the account's remote backend.
    pub session: Arc<dyn AccountSession>,
    /// Local media library access.
    pub assets: Arc<dyn AssetResolver>,
    /// Export/conversion delegate.
    pub exporter: Arc<dyn MediaExporter>,
    /// Export preferences derived from the media settings.
    pub prefs: ExportPreferences,
}

/// How an upload attempt ended. Outcomes are logged, counted into the run's
/// activity, and otherwise never surfaced to the enqueuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The transfer completed and the job was removed.
    Uploaded,
    /// A previous run already completed this upload; the job was removed
    /// without exporting or transferring anything.
    AlreadyUploaded,
    /// The recorded placeholder is still in flight elsewhere; the job was
    /// left untouched.
    UploadInFlight,
    /// The local asset no longer exists; the job was removed.
    AssetMissing,
    /// The backend rejected the upload permanently; the job was removed.
    Abandoned,
    /// Cancellation was observed at a checkpoint; the job was left
    /// untouched.
    Cancelled,
}

/// Error from one upload attempt. Transient failures leave the job queued
/// for a later scheduling pass.
#[derive(Debug, thiserror::Error)]
pub enum UploadTaskError {
    /// Transient failure — the job stays queued and is retried later.
    #[error("Transient upload failure: {0}")]
    Transient(String),

    /// Internal error (typically the store itself).
    #[error("Internal error: {0}")]
    Internal(#[from] AppError),
}

/// Uploads one asset to one destination folder, idempotently.
///
/// The operation is a unit of sequential work: it runs inside a pooled task
/// and awaits its sub-steps one after another. All writes go back through
/// the store's atomic mutator; the operation itself holds only a read-only
/// copy of the job.
pub struct UploadOperation {
    ctx: Arc<UploadContext>,
    asset_id: AssetId,
    job: UploadJob,
}

impl UploadOperation {
    /// Create an operation for one `(asset, job)` pair.
    pub fn new(ctx: Arc<UploadContext>, asset_id: AssetId, job: UploadJob) -> Self {
        Self { ctx, asset_id, job }
    }

    /// Run the upload attempt to its conclusion.
    pub async fn execute(&self, cancel: &CancelFlag) -> Result<UploadOutcome, UploadTaskError> {
        // Resume check: a recorded tracking id means a previous attempt got
        // at least as far as submission.
        if let Some(tracking_id) = &self.job.scheduled_tracking_id {
            match self.ctx.session.lookup_tracked_item(tracking_id).await {
                Ok(Some(item)) if !item.is_placeholder => {
                    self.remove_job().await?;
                    return Ok(UploadOutcome::AlreadyUploaded);
                }
                Ok(Some(_)) => {
                    // Still a placeholder: another attempt owns the transfer.
                    return Ok(UploadOutcome::UploadInFlight);
                }
                Ok(None) => {
                    // The backend forgot the placeholder; upload again.
                }
                Err(e) => {
                    return Err(UploadTaskError::Transient(format!(
                        "Tracking lookup for asset {} failed: {}",
                        self.asset_id, e
                    )));
                }
            }
        }

        // Cancellation checkpoint #1
        if cancel.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        let asset = match self.ctx.assets.resolve_asset(&self.asset_id).await {
            Ok(Some(asset)) => asset,
            Ok(None) => {
                // The asset was deleted locally; the job is unrecoverable.
                self.remove_job().await?;
                return Ok(UploadOutcome::AssetMissing);
            }
            Err(e) => {
                return Err(UploadTaskError::Transient(format!(
                    "Resolving asset {} failed: {}",
                    self.asset_id, e
                )));
            }
        };

        // Cancellation checkpoint #2 — export can be slow.
        if cancel.is_cancelled() {
            return Ok(UploadOutcome::Cancelled);
        }

        let parent = match self.ctx.session.resolve_item(&self.job.target_path).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                return Err(UploadTaskError::Transient(format!(
                    "Destination '{}' not found",
                    self.job.target_path
                )));
            }
            Err(e) => {
                return Err(UploadTaskError::Transient(format!(
                    "Resolving destination '{}' failed: {}",
                    self.job.target_path, e
                )));
            }
        };

        let exported = self
            .ctx
            .exporter
            .export(&asset, &self.ctx.prefs)
            .await
            .map_err(|e| {
                UploadTaskError::Transient(format!(
                    "Export of asset {} failed: {}",
                    self.asset_id, e
                ))
            })?;

        let handle = self
            .ctx
            .session
            .import_file(ImportRequest {
                name: exported.name,
                source: exported.source,
                parent,
            })
            .await
            .map_err(|e| {
                UploadTaskError::Transient(format!(
                    "Import of asset {} failed: {}",
                    self.asset_id, e
                ))
            })?;

        // Record the tracking id before waiting for completion: a crash in
        // this window is recovered through the resume check next run.
        self.ctx
            .store
            .set_tracking_id(
                &self.ctx.account,
                &self.asset_id,
                &self.job.target_path,
                handle.tracking_id.clone(),
            )
            .await?;

        match handle.completion.await {
            Ok(Ok(())) => {
                self.remove_job().await?;
                Ok(UploadOutcome::Uploaded)
            }
            Ok(Err(e)) if e.is_transient() => Err(UploadTaskError::Transient(format!(
                "Upload of asset {} failed: {}",
                self.asset_id, e
            ))),
            Ok(Err(e)) => {
                tracing::error!(
                    "Upload of asset {} to '{}' rejected permanently: {}",
                    self.asset_id,
                    self.job.target_path,
                    e
                );
                self.remove_job().await?;
                Ok(UploadOutcome::Abandoned)
            }
            Err(_) => Err(UploadTaskError::Transient(format!(
                "Upload of asset {} lost its completion signal",
                self.asset_id
            ))),
        }
    }

    async fn remove_job(&self) -> Result<(), AppError> {
        self.ctx
            .store
            .remove_job(&self.ctx.account, &self.asset_id, &self.job.target_path)
            .await
    }
}
