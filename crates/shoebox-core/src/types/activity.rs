//! Progress snapshot published to activity observers.

use serde::{Deserialize, Serialize};

/// A point-in-time view of an upload run, published to any observer (e.g. a
/// progress UI). The scheduler publishes one snapshot when a run starts,
/// one per finished operation, and a final one when the run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadActivityInfo {
    /// Stable identifier of this run's activity.
    pub id: String,
    /// Number of jobs the run started with.
    pub total: usize,
    /// Number of finished operations so far.
    pub completed: usize,
    /// Whether the run has been cancelled.
    pub cancelled: bool,
}
