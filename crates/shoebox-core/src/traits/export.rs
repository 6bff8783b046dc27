//! Media export seam.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::media::{ExportPreferences, ExportedMedia, MediaAsset};

/// Produces a transferable file from a media asset.
///
/// Format conversion (HEIC → JPEG, QuickTime → MP4, ...) is entirely the
/// exporter's concern; the engine only forwards the configured preferences.
#[async_trait]
pub trait MediaExporter: Send + Sync {
    /// Export `asset` to a local file, honoring `prefs` where possible.
    async fn export(
        &self,
        asset: &MediaAsset,
        prefs: &ExportPreferences,
    ) -> AppResult<ExportedMedia>;
}
