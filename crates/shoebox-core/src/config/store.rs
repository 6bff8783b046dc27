//! Durable queue store configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the SQLite-backed queue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the database file shared by all cooperating processes.
    #[serde(default = "default_path")]
    pub path: String,
    /// Seconds to wait on a locked database before giving up.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_seconds: default_busy_timeout(),
        }
    }
}

fn default_path() -> String {
    "data/shoebox/upload-queues.db".to_string()
}

fn default_busy_timeout() -> u64 {
    5
}
