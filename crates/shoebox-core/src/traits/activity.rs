//! Activity observation seam.

use crate::types::activity::UploadActivityInfo;

/// Receives progress snapshots from upload runs.
///
/// The scheduler publishes through whatever sink it is given and does not
/// depend on any observer existing; sinks must be cheap and non-blocking.
pub trait ActivitySink: Send + Sync {
    /// A run started.
    fn published(&self, activity: &UploadActivityInfo);

    /// A run made progress (one operation finished) or was cancelled.
    fn updated(&self, activity: &UploadActivityInfo);

    /// A run ended; the activity is no longer current.
    fn unpublished(&self, activity: &UploadActivityInfo);
}

/// An [`ActivitySink`] that logs progress through `tracing`.
#[derive(Debug, Default, Clone)]
pub struct LogActivitySink;

impl ActivitySink for LogActivitySink {
    fn published(&self, activity: &UploadActivityInfo) {
        tracing::info!(
            "Upload activity '{}' started: {} assets",
            activity.id,
            activity.total
        );
    }

    fn updated(&self, activity: &UploadActivityInfo) {
        tracing::debug!(
            "Upload activity '{}': {}/{} finished",
            activity.id,
            activity.completed,
            activity.total
        );
    }

    fn unpublished(&self, activity: &UploadActivityInfo) {
        tracing::info!(
            "Upload activity '{}' ended: {}/{} finished{}",
            activity.id,
            activity.completed,
            activity.total,
            if activity.cancelled { " (cancelled)" } else { "" }
        );
    }
}
