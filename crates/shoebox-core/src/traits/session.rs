//! Account session traits: the boundary to the remote storage backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::id::{AccountId, TrackingId};
use crate::types::remote::{ImportHandle, ImportRequest, RemoteItem};

/// Hands out per-account sessions for the duration of a scheduling run.
///
/// A session is requested when a run starts and returned when it ends;
/// providers typically reference-count the underlying connection.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open (or retain) a session for the given account.
    async fn request_session(&self, account: &AccountId) -> AppResult<Arc<dyn AccountSession>>;

    /// Release the session obtained from [`request_session`].
    ///
    /// [`request_session`]: SessionProvider::request_session
    async fn return_session(&self, account: &AccountId);
}

/// One account's view of the remote backend.
#[async_trait]
pub trait AccountSession: Send + Sync {
    /// Resolve an item by its stable remote path. Returns `None` when no
    /// such item exists.
    async fn resolve_item(&self, path: &str) -> AppResult<Option<RemoteItem>>;

    /// Submit a local file for import into a remote folder.
    ///
    /// On acceptance the backend creates a placeholder item immediately and
    /// the returned handle carries its tracking identifier; the transfer
    /// itself completes later through the handle's completion channel.
    async fn import_file(&self, request: ImportRequest) -> AppResult<ImportHandle>;

    /// Look up an item by the tracking identifier recorded at import time.
    /// Returns `None` when the backend no longer knows the identifier.
    async fn lookup_tracked_item(&self, id: &TrackingId) -> AppResult<Option<RemoteItem>>;
}
