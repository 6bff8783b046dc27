//! A single upload job.

use serde::{Deserialize, Serialize};

use shoebox_core::types::id::TrackingId;

/// The intent to upload one asset to one destination folder.
///
/// `scheduled_tracking_id` stays `None` until the backend has accepted the
/// upload and created a placeholder item; once set it allows a later run to
/// detect that the transfer already completed (or is still in flight) and
/// never re-upload the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJob {
    /// Destination folder path for the upload.
    pub target_path: String,
    /// Tracking identifier of the placeholder created on submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_tracking_id: Option<TrackingId>,
}

impl UploadJob {
    /// Create a job for the given destination folder.
    pub fn new(target_path: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            scheduled_tracking_id: None,
        }
    }
}
