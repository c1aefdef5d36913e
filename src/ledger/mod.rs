//! # Run Ledger
//!
//! Durable record of every [`FailoverRun`]: the audit trail, the source for
//! `resume`, and the history the orchestrator consults when deciding whether a
//! cache invalidation was already issued for an identical plan.
//!
//! Backends:
//! - [`InMemoryRunLedger`] for tests and simulation
//! - [`FileRunLedger`], one JSON document per run, replaced atomically
//! - [`PgRunLedger`], PostgreSQL via `sqlx` (see `migrations/`)

pub mod file;
pub mod in_memory;
pub mod postgres;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::error::FailoverResult;
use crate::models::FailoverRun;
use crate::orchestration::lock::{FailoverLock, FileFailoverLock, InProcessFailoverLock, PgFailoverLock};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub use file::FileRunLedger;
pub use in_memory::InMemoryRunLedger;
pub use postgres::PgRunLedger;

#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Insert or replace the stored document for `run.id`
    async fn persist(&self, run: &FailoverRun) -> FailoverResult<()>;

    /// Fails with `RunNotFound` when no run has that id
    async fn load(&self, run_id: Uuid) -> FailoverResult<FailoverRun>;

    /// Every run of the plan with this key, oldest first
    async fn runs_for_plan(&self, plan_key: Uuid) -> FailoverResult<Vec<FailoverRun>>;
}

/// Ledger and lock built from the same backend settings
#[derive(Clone)]
pub struct LedgerBackends {
    pub ledger: Arc<dyn RunLedger>,
    pub lock: Arc<dyn FailoverLock>,
}

impl LedgerBackends {
    pub async fn from_config(config: &LedgerConfig) -> FailoverResult<Self> {
        let backends = match config.backend {
            LedgerBackend::Memory => Self {
                ledger: Arc::new(InMemoryRunLedger::new()),
                lock: Arc::new(InProcessFailoverLock::new()),
            },
            LedgerBackend::File => Self {
                ledger: Arc::new(FileRunLedger::open(&config.directory).await?),
                lock: Arc::new(FileFailoverLock::open(config.directory.join("locks")).await?),
            },
            LedgerBackend::Postgres => {
                let pool = postgres::connect(config).await?;
                Self {
                    ledger: Arc::new(PgRunLedger::new(pool.clone())),
                    lock: Arc::new(PgFailoverLock::new(pool)),
                }
            }
        };

        info!(backend = ?config.backend, "Run ledger ready");
        Ok(backends)
    }
}

impl std::fmt::Debug for LedgerBackends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerBackends").finish_non_exhaustive()
    }
}

/// Stable ordering for `runs_for_plan` results
pub(crate) fn sort_runs(runs: &mut [FailoverRun]) {
    runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
}
