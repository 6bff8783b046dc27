//! Remote item and import types exchanged with an account session.

use std::path::PathBuf;

use tokio::sync::oneshot;

use super::id::TrackingId;
use crate::result::AppResult;

/// An item known to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    /// Stable path of the item on the remote side.
    pub path: String,
    /// Tracking identifier of the item.
    pub tracking_id: TrackingId,
    /// `true` while the item is an in-flight placeholder whose transfer has
    /// not been confirmed complete.
    pub is_placeholder: bool,
}

/// Request to import a local file into a remote parent folder.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// File name for the created item.
    pub name: String,
    /// Local file to transfer.
    pub source: PathBuf,
    /// Destination folder.
    pub parent: RemoteItem,
}

/// Handle returned when the backend accepts an import.
///
/// The `tracking_id` identifies the placeholder created immediately on
/// submission; `completion` resolves once the transfer fully materializes
/// (or fails). Dropping the sending side before completion is reported as a
/// transient failure by the receiver.
#[derive(Debug)]
pub struct ImportHandle {
    /// Identifier of the placeholder item created for this import.
    pub tracking_id: TrackingId,
    /// Resolves when the upload finishes.
    pub completion: oneshot::Receiver<AppResult<()>>,
}
