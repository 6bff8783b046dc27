//! Periodic sweeps that keep the upload queues moving.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};

use shoebox_core::config::sweep::SweepConfig;
use shoebox_core::error::AppError;
use shoebox_core::result::AppResult;

use crate::instant::InstantUploadScan;
use crate::scheduler::UploadScheduler;

/// Cron-driven sweeps: re-drive accounts whose queues still hold jobs
/// (crash leftovers, transient failures) and run the instant-upload scan.
pub struct UploadSweeper {
    /// The underlying cron scheduler
    cron: JobScheduler,
    /// Upload scheduler driven by the sweeps
    uploads: UploadScheduler,
    /// Instant-upload scan, when configured
    instant: Option<Arc<InstantUploadScan>>,
    /// Sweep configuration
    config: SweepConfig,
}

impl std::fmt::Debug for UploadSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSweeper").finish()
    }
}

impl UploadSweeper {
    /// Create a new sweeper.
    pub async fn new(
        uploads: UploadScheduler,
        instant: Option<Arc<InstantUploadScan>>,
        config: SweepConfig,
    ) -> AppResult<Self> {
        let cron = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create sweep scheduler: {}", e)))?;

        Ok(Self {
            cron,
            uploads,
            instant,
            config,
        })
    }

    /// Register all configured sweep tasks.
    pub async fn register_default_tasks(&self) -> AppResult<()> {
        if !self.config.enabled {
            tracing::info!("Upload sweeps disabled by configuration");
            return Ok(());
        }

        self.register_pending_sweep().await?;
        if self.instant.is_some() {
            self.register_instant_scan().await?;
        }

        tracing::info!("All upload sweep tasks registered");
        Ok(())
    }

    /// Start the sweeper.
    pub async fn start(&self) -> AppResult<()> {
        self.cron
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start sweep scheduler: {}", e)))?;

        tracing::info!("Upload sweeper started");
        Ok(())
    }

    /// Shutdown the sweeper.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.cron
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown sweep scheduler: {}", e)))?;

        tracing::info!("Upload sweeper shut down");
        Ok(())
    }

    /// Pending-upload sweep: any account with leftover jobs gets a
    /// scheduling pass.
    async fn register_pending_sweep(&self) -> AppResult<()> {
        let uploads = self.uploads.clone();
        let job = CronJob::new_async(self.config.pending_schedule.as_str(), move |_uuid, _lock| {
            let uploads = uploads.clone();
            Box::pin(async move {
                let accounts = match uploads.store().pending_accounts().await {
                    Ok(accounts) => accounts,
                    Err(e) => {
                        tracing::error!("Pending-upload sweep failed to scan accounts: {}", e);
                        return;
                    }
                };
                if accounts.is_empty() {
                    tracing::trace!("Pending-upload sweep found nothing to do");
                    return;
                }
                tracing::debug!(
                    "Pending-upload sweep re-driving {} account(s)",
                    accounts.len()
                );
                for account in accounts {
                    if let Err(e) = uploads.run_if_needed(&account).await {
                        tracing::error!(
                            "Pending-upload sweep failed for account {}: {}",
                            account,
                            e
                        );
                    }
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create pending sweep: {}", e)))?;

        self.cron
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add pending sweep: {}", e)))?;

        tracing::info!(
            "Registered: pending-upload sweep ({})",
            self.config.pending_schedule
        );
        Ok(())
    }

    /// Instant-upload scan: enqueue newly captured media.
    async fn register_instant_scan(&self) -> AppResult<()> {
        let Some(instant) = self.instant.as_ref().map(Arc::clone) else {
            return Ok(());
        };

        let job = CronJob::new_async(self.config.instant_schedule.as_str(), move |_uuid, _lock| {
            let instant = Arc::clone(&instant);
            Box::pin(async move {
                match instant.scan().await {
                    Ok(0) => tracing::trace!("Instant-upload scan found no new media"),
                    Ok(count) => {
                        tracing::debug!("Instant-upload scan enqueued {} asset(s)", count)
                    }
                    Err(e) => tracing::error!(
                        "Instant-upload scan failed for account {}: {}",
                        instant.account(),
                        e
                    ),
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create instant scan: {}", e)))?;

        self.cron
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add instant scan: {}", e)))?;

        tracing::info!(
            "Registered: instant-upload scan ({})",
            self.config.instant_schedule
        );
        Ok(())
    }
}
