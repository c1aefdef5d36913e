//! # Failover Lock
//!
//! Mutual exclusion per global cluster: at most one run may be `Running` for a
//! given `global_cluster_id`. Acquisition never waits; a held lock is reported
//! immediately so the caller can fail the run with
//! `ConcurrentFailoverInProgress`.
//!
//! Acquiring is re-entrant for the holding run, which lets `resume` take the
//! lock back after a crash left it held.

use crate::error::{FailoverError, FailoverResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::PgPool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

#[async_trait]
pub trait FailoverLock: Send + Sync {
    /// `true` when `run_id` now holds the lock for `key`
    async fn try_acquire(&self, key: &str, run_id: Uuid) -> FailoverResult<bool>;

    /// Release the lock if `run_id` holds it; releasing a lock held by another
    /// run is a no-op
    async fn release(&self, key: &str, run_id: Uuid) -> FailoverResult<()>;
}

/// Lock table shared by orchestrators in one process
#[derive(Debug, Clone, Default)]
pub struct InProcessFailoverLock {
    holders: Arc<DashMap<String, Uuid>>,
}

impl InProcessFailoverLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailoverLock for InProcessFailoverLock {
    async fn try_acquire(&self, key: &str, run_id: Uuid) -> FailoverResult<bool> {
        match self.holders.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(*entry.get() == run_id),
            Entry::Vacant(entry) => {
                entry.insert(run_id);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, run_id: Uuid) -> FailoverResult<()> {
        self.holders.remove_if(key, |_, holder| *holder == run_id);
        Ok(())
    }
}

/// Cross-process lock: one exclusively-created file per global cluster
#[derive(Debug, Clone)]
pub struct FileFailoverLock {
    directory: PathBuf,
}

impl FileFailoverLock {
    pub async fn open(directory: impl AsRef<Path>) -> FailoverResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)
            .await
            .map_err(|e| FailoverError::Lock(format!("cannot create lock directory: {e}")))?;
        Ok(Self { directory })
    }

    /// Hex keeps distinct keys on distinct files whatever characters they hold
    fn lock_path(&self, key: &str) -> PathBuf {
        let file_name: String = key.bytes().map(|b| format!("{b:02x}")).collect();
        self.directory.join(format!("{file_name}.lock"))
    }

    async fn read_holder(path: &Path) -> FailoverResult<Option<Uuid>> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Uuid::parse_str(contents.trim()).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FailoverError::Lock(format!("cannot read {}: {e}", path.display()))),
        }
    }
}

#[async_trait]
impl FailoverLock for FileFailoverLock {
    async fn try_acquire(&self, key: &str, run_id: Uuid) -> FailoverResult<bool> {
        let path = self.lock_path(key);
        let created = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match created {
            Ok(mut file) => {
                file.write_all(run_id.to_string().as_bytes())
                    .await
                    .map_err(|e| FailoverError::Lock(format!("cannot write {}: {e}", path.display())))?;
                file.sync_all()
                    .await
                    .map_err(|e| FailoverError::Lock(format!("cannot sync {}: {e}", path.display())))?;
                debug!(key = %key, run_id = %run_id, "Acquired file lock");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = Self::read_holder(&path).await?;
                if holder.is_none() {
                    warn!(path = %path.display(), "Lock file without a readable holder");
                }
                Ok(holder == Some(run_id))
            }
            Err(e) => Err(FailoverError::Lock(format!(
                "cannot create {}: {e}",
                path.display()
            ))),
        }
    }

    async fn release(&self, key: &str, run_id: Uuid) -> FailoverResult<()> {
        let path = self.lock_path(key);
        if Self::read_holder(&path).await? != Some(run_id) {
            return Ok(());
        }
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FailoverError::Lock(format!("cannot remove {}: {e}", path.display()))),
        }
    }
}

/// Lock rows in `failover_locks`
#[derive(Debug, Clone)]
pub struct PgFailoverLock {
    pool: PgPool,
}

impl PgFailoverLock {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FailoverLock for PgFailoverLock {
    #[instrument(skip(self))]
    async fn try_acquire(&self, key: &str, run_id: Uuid) -> FailoverResult<bool> {
        // The no-op update only matches the current holder, so a row comes
        // back exactly when the caller owns the lock afterwards
        let query = r#"
            INSERT INTO failover_locks (global_cluster_id, run_id)
            VALUES ($1, $2)
            ON CONFLICT (global_cluster_id) DO UPDATE
            SET run_id = failover_locks.run_id
            WHERE failover_locks.run_id = EXCLUDED.run_id
            RETURNING run_id
        "#;

        let row: Option<(Uuid,)> = sqlx::query_as(query)
            .bind(key)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to acquire failover lock {}: {}", key, e);
                FailoverError::Lock(format!("Lock acquisition failed: {e}"))
            })?;

        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn release(&self, key: &str, run_id: Uuid) -> FailoverResult<()> {
        sqlx::query("DELETE FROM failover_locks WHERE global_cluster_id = $1 AND run_id = $2")
            .bind(key)
            .bind(run_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to release failover lock {}: {}", key, e);
                FailoverError::Lock(format!("Lock release failed: {e}"))
            })?;
        Ok(())
    }
}
