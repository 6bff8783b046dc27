//! The per-account upload queue record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use shoebox_core::types::id::{AssetId, TrackingId};

use super::job::UploadJob;
use super::lease::RunnerLease;

/// Everything persisted for one account: the ordered queue of asset ids,
/// the jobs per asset, and the lease of whichever runner is draining it.
///
/// Invariant: an asset id appears in `queue` iff `jobs` holds a non-empty
/// job list for it. All mutation helpers preserve this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadQueueState {
    /// Asset ids in insertion order, each at most once.
    #[serde(default)]
    pub queue: Vec<AssetId>,
    /// Jobs keyed by asset id. An asset can have several jobs when it is
    /// uploaded to several destination folders.
    #[serde(default)]
    pub jobs: HashMap<AssetId, Vec<UploadJob>>,
    /// Lease of the runner currently draining this queue, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<RunnerLease>,
}

impl UploadQueueState {
    /// Total number of jobs across all assets.
    pub fn job_count(&self) -> usize {
        self.jobs.values().map(Vec::len).sum()
    }

    /// Queue a job for `asset_id` targeting `target_path`.
    ///
    /// Idempotent: an existing job for the same `(asset, path)` pair is kept
    /// as-is, and the asset id is appended to the queue only when absent.
    pub fn add_job(&mut self, asset_id: &AssetId, target_path: &str) {
        if !self.queue.contains(asset_id) {
            self.queue.push(asset_id.clone());
        }
        let jobs = self.jobs.entry(asset_id.clone()).or_default();
        if !jobs.iter().any(|j| j.target_path == target_path) {
            jobs.push(UploadJob::new(target_path));
        }
    }

    /// Remove the job for `(asset_id, target_path)`; drops the asset from
    /// the queue when its last job goes. Removing a job that does not exist
    /// is a no-op.
    pub fn remove_job(&mut self, asset_id: &AssetId, target_path: &str) {
        let Some(jobs) = self.jobs.get_mut(asset_id) else {
            return;
        };
        jobs.retain(|j| j.target_path != target_path);
        if jobs.is_empty() {
            self.jobs.remove(asset_id);
            self.queue.retain(|id| id != asset_id);
        }
    }

    /// Attach the tracking identifier to the job for `(asset_id,
    /// target_path)`, if present.
    pub fn set_tracking_id(&mut self, asset_id: &AssetId, target_path: &str, id: TrackingId) {
        if let Some(job) = self
            .jobs
            .get_mut(asset_id)
            .and_then(|jobs| jobs.iter_mut().find(|j| j.target_path == target_path))
        {
            job.scheduled_tracking_id = Some(id);
        }
    }

    /// Drop every queued job. The lease is left untouched: clearing happens
    /// inside a run that still owns it.
    pub fn clear_jobs(&mut self) {
        self.queue.clear();
        self.jobs.clear();
    }
}
