//! # PostgreSQL Run Ledger
//!
//! Stores each run as a JSONB document in `failover_runs`, alongside the
//! columns the orchestrator queries by (`plan_key`, `global_cluster_id`,
//! `status`). Schema lives in `migrations/`.

use super::RunLedger;
use crate::config::LedgerConfig;
use crate::error::{FailoverError, FailoverResult};
use crate::models::FailoverRun;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Connect a pool for the ledger and lock tables and apply pending migrations
pub async fn connect(config: &LedgerConfig) -> FailoverResult<PgPool> {
    let database_url = config.database_url.as_deref().ok_or_else(|| {
        FailoverError::Configuration("ledger.database_url is required for the postgres backend".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to ledger database: {}", e);
            FailoverError::Ledger(format!("Ledger database connection failed: {e}"))
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| FailoverError::Ledger(format!("Ledger migration failed: {e}")))?;

    info!(max_connections = config.max_connections, "Connected to ledger database");
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgRunLedger {
    pool: PgPool,
}

impl PgRunLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RunLedger for PgRunLedger {
    #[instrument(skip(self, run), fields(run_id = %run.id, status = %run.status))]
    async fn persist(&self, run: &FailoverRun) -> FailoverResult<()> {
        let query = r#"
            INSERT INTO failover_runs
                (run_id, plan_key, global_cluster_id, status, document, started_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (run_id) DO UPDATE
            SET status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
        "#;

        sqlx::query(query)
            .bind(run.id)
            .bind(run.plan_key)
            .bind(&run.plan.global_cluster_id)
            .bind(run.status.to_string())
            .bind(Json(run))
            .bind(run.started_at)
            .bind(run.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to persist run {}: {}", run.id, e);
                FailoverError::Ledger(format!("Run persistence failed: {e}"))
            })?;

        debug!("Persisted run document");
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> FailoverResult<FailoverRun> {
        let row: Option<(Json<FailoverRun>,)> =
            sqlx::query_as("SELECT document FROM failover_runs WHERE run_id = $1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(Json(run),)| run)
            .ok_or(FailoverError::RunNotFound(run_id))
    }

    async fn runs_for_plan(&self, plan_key: Uuid) -> FailoverResult<Vec<FailoverRun>> {
        let rows: Vec<(Json<FailoverRun>,)> = sqlx::query_as(
            "SELECT document FROM failover_runs WHERE plan_key = $1 ORDER BY started_at, run_id",
        )
        .bind(plan_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(run),)| run).collect())
    }
}
