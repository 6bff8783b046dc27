//! Live progress handle for one scheduling run.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use uuid::Uuid;

use shoebox_core::types::activity::UploadActivityInfo;

/// Progress and cancellation state of an active upload run.
///
/// Shared between the scheduler, its operations, and `cancel_all`; observers
/// receive immutable [`UploadActivityInfo`] snapshots through the activity
/// sink.
#[derive(Debug)]
pub struct UploadActivity {
    id: String,
    total: usize,
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl UploadActivity {
    /// Create an activity for a run that starts with `total` jobs.
    pub fn new(total: usize) -> Self {
        Self {
            id: format!("upload-run:{}", Uuid::new_v4()),
            total,
            completed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Stable identifier of this run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Count one finished operation; returns the new completed count.
    pub fn record_finished_upload(&self) -> usize {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Mark the run cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the run has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Immutable snapshot for publication.
    pub fn snapshot(&self) -> UploadActivityInfo {
        UploadActivityInfo {
            id: self.id.clone(),
            total: self.total,
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.is_cancelled(),
        }
    }
}
