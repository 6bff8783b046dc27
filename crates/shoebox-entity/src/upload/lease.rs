//! Runner lease: who may drain an account's queue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lease recorded inside the queue record while a runner drains it.
///
/// At most one runner per account across all cooperating processes holds a
/// valid lease. The holder refreshes `expires_at` periodically; a lease
/// whose expiry has passed is stale and may be reclaimed by any process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerLease {
    /// Token minted for one scheduling run.
    pub token: Uuid,
    /// Identifier of the process that acquired the lease.
    pub process_id: String,
    /// When the lease was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lease stops being valid unless refreshed.
    pub expires_at: DateTime<Utc>,
}

impl RunnerLease {
    /// Mint a fresh lease valid for `ttl_seconds` from `now`.
    pub fn new(token: Uuid, process_id: impl Into<String>, now: DateTime<Utc>, ttl_seconds: u64) -> Self {
        Self {
            token,
            process_id: process_id.into(),
            acquired_at: now,
            expires_at: now + Duration::seconds(ttl_seconds as i64),
        }
    }

    /// Whether the lease has lapsed as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
