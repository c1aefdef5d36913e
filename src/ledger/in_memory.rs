use super::{sort_runs, RunLedger};
use crate::error::{FailoverError, FailoverResult};
use crate::models::FailoverRun;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Process-local ledger; clones share storage
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunLedger {
    runs: Arc<DashMap<Uuid, FailoverRun>>,
}

impl InMemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn all_runs(&self) -> Vec<FailoverRun> {
        let mut runs: Vec<FailoverRun> = self.runs.iter().map(|entry| entry.value().clone()).collect();
        sort_runs(&mut runs);
        runs
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn persist(&self, run: &FailoverRun) -> FailoverResult<()> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> FailoverResult<FailoverRun> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(FailoverError::RunNotFound(run_id))
    }

    async fn runs_for_plan(&self, plan_key: Uuid) -> FailoverResult<Vec<FailoverRun>> {
        let mut runs: Vec<FailoverRun> = self
            .runs
            .iter()
            .filter(|entry| entry.value().plan_key == plan_key)
            .map(|entry| entry.value().clone())
            .collect();
        sort_runs(&mut runs);
        Ok(runs)
    }
}
