//! The SQLite-backed queue store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use shoebox_core::config::store::StoreConfig;
use shoebox_core::error::{AppError, ErrorKind};
use shoebox_core::result::AppResult;
use shoebox_core::types::id::{AccountId, AssetId, TrackingId};
use shoebox_core::types::media::MediaKind;
use shoebox_entity::{RunnerLease, UploadQueueState};

/// Durable per-account upload queue records.
///
/// One row per account holds the JSON-encoded [`UploadQueueState`]. All
/// mutations go through [`QueueStore::mutate_with`], a single
/// `BEGIN IMMEDIATE` transaction: the write lock is taken before the read,
/// so concurrent mutators — including ones in other processes — serialize
/// on SQLite's file lock and never interleave between read and write.
#[derive(Debug, Clone)]
pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    /// Open the store described by the configuration section.
    pub async fn from_config(config: &StoreConfig) -> AppResult<Self> {
        Self::open(
            Path::new(&config.path),
            Duration::from_secs(config.busy_timeout_seconds),
        )
        .await
    }

    /// Open (creating if missing) the store at `path`.
    pub async fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> AppResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Invalid store path", e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            // Absorbs lock contention from other processes sharing the file.
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            // One connection per process: writes within this process already
            // serialize on the record-level transaction.
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to open store", e))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS upload_queues ( \
                account_id TEXT PRIMARY KEY, \
                state TEXT NOT NULL, \
                updated_at TEXT NOT NULL \
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create queue table", e))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS upload_watermarks ( \
                account_id TEXT NOT NULL, \
                media_kind TEXT NOT NULL, \
                uploaded_until TEXT NOT NULL, \
                PRIMARY KEY (account_id, media_kind) \
             )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create watermark table", e)
        })?;

        Ok(())
    }

    // ── Atomic record access ─────────────────────────────────────

    /// Read the current queue record, or `None` when the account has never
    /// enqueued anything.
    pub async fn read(&self, account: &AccountId) -> AppResult<Option<UploadQueueState>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT state FROM upload_queues WHERE account_id = ?1")
                .bind(account.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to read queue record", e)
                })?;

        row.map(|(state,)| serde_json::from_str(&state).map_err(AppError::from))
            .transpose()
    }

    /// Atomically transform the queue record and return the transform's
    /// result alongside the state that was written back.
    ///
    /// An absent record is presented to `f` as the empty state.
    pub async fn mutate_with<R, F>(
        &self,
        account: &AccountId,
        f: F,
    ) -> AppResult<(UploadQueueState, R)>
    where
        F: FnOnce(&mut UploadQueueState) -> R + Send,
        R: Send,
    {
        let mut txn = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT state FROM upload_queues WHERE account_id = ?1")
                .bind(account.to_string())
                .fetch_optional(&mut *txn)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to read queue record", e)
                })?;

        let mut state: UploadQueueState = match row {
            Some((encoded,)) => serde_json::from_str(&encoded)?,
            None => UploadQueueState::default(),
        };

        let result = f(&mut state);

        sqlx::query(
            "INSERT INTO upload_queues (account_id, state, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(account_id) DO UPDATE SET \
                state = excluded.state, updated_at = excluded.updated_at",
        )
        .bind(account.to_string())
        .bind(serde_json::to_string(&state)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *txn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to write queue record", e)
        })?;

        txn.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit queue record", e)
        })?;

        Ok((state, result))
    }

    /// Atomically transform the queue record, discarding the closure result.
    pub async fn mutate<F>(&self, account: &AccountId, f: F) -> AppResult<UploadQueueState>
    where
        F: FnOnce(&mut UploadQueueState) + Send,
    {
        let (state, ()) = self.mutate_with(account, f).await?;
        Ok(state)
    }

    // ── Job operations ───────────────────────────────────────────

    /// Queue one job. Idempotent per `(asset, path)` pair.
    pub async fn add_job(
        &self,
        account: &AccountId,
        asset_id: &AssetId,
        target_path: &str,
    ) -> AppResult<()> {
        self.mutate(account, |state| state.add_job(asset_id, target_path))
            .await?;
        Ok(())
    }

    /// Queue one job per asset in a single atomic mutation.
    pub async fn add_jobs(
        &self,
        account: &AccountId,
        asset_ids: &[AssetId],
        target_path: &str,
    ) -> AppResult<()> {
        self.mutate(account, |state| {
            for asset_id in asset_ids {
                state.add_job(asset_id, target_path);
            }
        })
        .await?;
        Ok(())
    }

    /// Remove one job. Removing a job that does not exist is a no-op.
    pub async fn remove_job(
        &self,
        account: &AccountId,
        asset_id: &AssetId,
        target_path: &str,
    ) -> AppResult<()> {
        self.mutate(account, |state| state.remove_job(asset_id, target_path))
            .await?;
        Ok(())
    }

    /// Record the tracking identifier for an accepted upload.
    pub async fn set_tracking_id(
        &self,
        account: &AccountId,
        asset_id: &AssetId,
        target_path: &str,
        id: TrackingId,
    ) -> AppResult<()> {
        self.mutate(account, |state| {
            state.set_tracking_id(asset_id, target_path, id)
        })
        .await?;
        Ok(())
    }

    /// Total number of queued jobs for the account.
    pub async fn job_count(&self, account: &AccountId) -> AppResult<usize> {
        Ok(self
            .read(account)
            .await?
            .map(|state| state.job_count())
            .unwrap_or(0))
    }

    /// Drop every queued job for the account.
    pub async fn clear_jobs(&self, account: &AccountId) -> AppResult<()> {
        self.mutate(account, |state| state.clear_jobs()).await?;
        Ok(())
    }

    // ── Lease operations ─────────────────────────────────────────

    /// Acquire the runner lease when it is free, expired, or reported stale
    /// by `consider_stale` (the caller's extra liveness knowledge about the
    /// current holder). Returns whether `lease` now holds it.
    pub async fn try_acquire_lease<F>(
        &self,
        account: &AccountId,
        lease: RunnerLease,
        consider_stale: F,
    ) -> AppResult<bool>
    where
        F: FnOnce(&RunnerLease) -> bool + Send,
    {
        let (_, acquired) = self
            .mutate_with(account, |state| {
                if let Some(current) = &state.lease {
                    if !current.is_expired(Utc::now()) && !consider_stale(current) {
                        return false;
                    }
                }
                state.lease = Some(lease);
                true
            })
            .await?;
        Ok(acquired)
    }

    /// Extend the lease expiry, provided `token` still holds it.
    pub async fn refresh_lease(
        &self,
        account: &AccountId,
        token: Uuid,
        ttl_seconds: u64,
    ) -> AppResult<bool> {
        let (_, refreshed) = self
            .mutate_with(account, |state| match &mut state.lease {
                Some(lease) if lease.token == token => {
                    lease.expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
                    true
                }
                _ => false,
            })
            .await?;
        Ok(refreshed)
    }

    /// Clear the lease, provided `token` still holds it.
    pub async fn release_lease(&self, account: &AccountId, token: Uuid) -> AppResult<bool> {
        let (_, released) = self
            .mutate_with(account, |state| match &state.lease {
                Some(lease) if lease.token == token => {
                    state.lease = None;
                    true
                }
                _ => false,
            })
            .await?;
        Ok(released)
    }

    // ── Instant-upload watermarks ────────────────────────────────

    /// Creation date up to which assets of `kind` have already been
    /// enqueued, or `None` when instant upload has never run.
    pub async fn upload_watermark(
        &self,
        account: &AccountId,
        kind: MediaKind,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT uploaded_until FROM upload_watermarks \
             WHERE account_id = ?1 AND media_kind = ?2",
        )
        .bind(account.to_string())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to read watermark", e))?;

        row.map(|(ts,)| {
            DateTime::parse_from_rfc3339(&ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| AppError::with_source(ErrorKind::Serialization, "Bad watermark", e))
        })
        .transpose()
    }

    /// Advance the watermark for `kind`.
    pub async fn set_upload_watermark(
        &self,
        account: &AccountId,
        kind: MediaKind,
        uploaded_until: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO upload_watermarks (account_id, media_kind, uploaded_until) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(account_id, media_kind) DO UPDATE SET \
                uploaded_until = excluded.uploaded_until",
        )
        .bind(account.to_string())
        .bind(kind.as_str())
        .bind(uploaded_until.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to write watermark", e))?;
        Ok(())
    }

    // ── Sweeping ─────────────────────────────────────────────────

    /// Accounts whose queue currently holds at least one job.
    pub async fn pending_accounts(&self) -> AppResult<Vec<AccountId>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT account_id, state FROM upload_queues")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to scan queue records", e)
                })?;

        let mut pending = Vec::new();
        for (account_id, encoded) in rows {
            let Ok(account) = account_id.parse::<AccountId>() else {
                tracing::warn!("Skipping queue record with malformed account id '{account_id}'");
                continue;
            };
            let state: UploadQueueState = serde_json::from_str(&encoded)?;
            if state.job_count() > 0 {
                pending.push(account);
            }
        }
        Ok(pending)
    }
}
