//! Local media library access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::result::AppResult;
use crate::types::id::AssetId;
use crate::types::media::{MediaAsset, MediaKind};

/// Resolves media assets from the platform's library.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Resolve an asset by its stable identifier. Returns `None` when the
    /// asset no longer exists locally (e.g. deleted by the user).
    async fn resolve_asset(&self, id: &AssetId) -> AppResult<Option<MediaAsset>>;

    /// List assets of the given kinds captured strictly after `after`,
    /// ordered by creation date ascending. Used by the instant-upload scan.
    async fn assets_created_after(
        &self,
        after: DateTime<Utc>,
        kinds: &[MediaKind],
    ) -> AppResult<Vec<MediaAsset>>;
}
