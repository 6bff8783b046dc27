//! Upload scheduler configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the per-account upload scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// Number of concurrent upload operations per scheduling run.
    /// `0` means "use the host's available parallelism".
    #[serde(default)]
    pub concurrency: usize,
    /// Seconds a runner lease stays valid without a heartbeat refresh.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_seconds: u64,
}

impl UploaderConfig {
    /// Effective worker pool size for a scheduling run.
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency > 0 {
            return self.concurrency;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(DEFAULT_CONCURRENCY)
    }
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            concurrency: 0,
            lease_ttl_seconds: default_lease_ttl(),
        }
    }
}

const DEFAULT_CONCURRENCY: usize = 4;

fn default_lease_ttl() -> u64 {
    60
}
