//! Periodic sweep configuration.

use serde::{Deserialize, Serialize};

/// Settings for the background sweeps that re-drive pending uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the periodic sweeps run at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression for the pending-upload sweep.
    #[serde(default = "default_pending_schedule")]
    pub pending_schedule: String,
    /// Cron expression for the instant-upload scan.
    #[serde(default = "default_instant_schedule")]
    pub instant_schedule: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_schedule: default_pending_schedule(),
            instant_schedule: default_instant_schedule(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pending_schedule() -> String {
    // Every 5 minutes
    "0 */5 * * * *".to_string()
}

fn default_instant_schedule() -> String {
    // Every 15 minutes
    "0 */15 * * * *".to_string()
}
