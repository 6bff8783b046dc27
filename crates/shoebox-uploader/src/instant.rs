//! Instant upload: enqueue newly captured media automatically.

use std::sync::Arc;

use chrono::Utc;

use shoebox_core::config::instant::InstantUploadConfig;
use shoebox_core::result::AppResult;
use shoebox_core::traits::AssetResolver;
use shoebox_core::types::id::{AccountId, AssetId};
use shoebox_core::types::media::MediaKind;

use crate::scheduler::UploadScheduler;

/// Scans the camera roll for assets captured since the last scan and queues
/// them for upload to the configured folder.
///
/// Photos and videos keep independent watermarks, so enabling one kind
/// later does not backfill the other. The first scan for a kind only plants
/// the watermark: instant upload covers media captured from activation
/// onward, never the existing library.
pub struct InstantUploadScan {
    account: AccountId,
    scheduler: UploadScheduler,
    assets: Arc<dyn AssetResolver>,
    config: InstantUploadConfig,
}

impl InstantUploadScan {
    /// Create a scan for the account instant upload is configured for.
    pub fn new(
        account: AccountId,
        scheduler: UploadScheduler,
        assets: Arc<dyn AssetResolver>,
        config: InstantUploadConfig,
    ) -> Self {
        Self {
            account,
            scheduler,
            assets,
            config,
        }
    }

    /// The account this scan feeds.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Run one scan over all enabled media kinds. Returns the number of
    /// assets enqueued.
    pub async fn scan(&self) -> AppResult<usize> {
        if !self.config.enabled() {
            return Ok(0);
        }

        let mut enqueued = 0;
        if self.config.photos {
            enqueued += self.scan_kind(MediaKind::Photo).await?;
        }
        if self.config.videos {
            enqueued += self.scan_kind(MediaKind::Video).await?;
        }
        Ok(enqueued)
    }

    async fn scan_kind(&self, kind: MediaKind) -> AppResult<usize> {
        let store = self.scheduler.store();

        let Some(watermark) = store.upload_watermark(&self.account, kind).await? else {
            // First activation: start from now.
            store
                .set_upload_watermark(&self.account, kind, Utc::now())
                .await?;
            tracing::info!(
                "Instant {} upload activated for account {}",
                kind.as_str(),
                self.account
            );
            return Ok(0);
        };

        let assets = self
            .assets
            .assets_created_after(watermark, &[kind])
            .await?;
        let Some(newest) = assets.last() else {
            return Ok(0);
        };
        let newest_created_at = newest.created_at;

        let ids: Vec<AssetId> = assets.iter().map(|a| a.id.clone()).collect();
        tracing::debug!(
            "Instant upload enqueueing {} {} assets for account {}",
            ids.len(),
            kind.as_str(),
            self.account
        );

        self.scheduler
            .enqueue(&self.account, &ids, &self.config.target_path)
            .await?;
        store
            .set_upload_watermark(&self.account, kind, newest_created_at)
            .await?;

        Ok(ids.len())
    }
}
