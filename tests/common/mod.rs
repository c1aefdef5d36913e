#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use failover_core::adapters::{ControlPlane, InMemoryControlPlane};
use failover_core::approval::{ApprovalGate, StaticApprovalGate};
use failover_core::config::{FailoverConfig, RetryConfig};
use failover_core::error::{FailoverError, FailoverResult};
use failover_core::ledger::{InMemoryRunLedger, RunLedger};
use failover_core::models::{FailoverPlan, FailoverRun};
use failover_core::orchestration::{FailoverOrchestrator, InProcessFailoverLock};
use failover_core::test_utils::{pre_failover_control_plane, sample_plan};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Configuration with no backoff delay so retry paths run instantly
pub fn fast_config() -> FailoverConfig {
    FailoverConfig {
        retry: RetryConfig::immediate(5, 2),
        ..FailoverConfig::default()
    }
}

/// Reference plan, pre-failover control plane and shared in-memory backends
pub struct Harness {
    pub plan: FailoverPlan,
    pub control_plane: InMemoryControlPlane,
    pub ledger: InMemoryRunLedger,
    pub lock: InProcessFailoverLock,
}

impl Harness {
    pub fn new() -> Self {
        let plan = sample_plan();
        let control_plane = pre_failover_control_plane(&plan);
        Self {
            plan,
            control_plane,
            ledger: InMemoryRunLedger::new(),
            lock: InProcessFailoverLock::new(),
        }
    }

    pub fn orchestrator(&self) -> FailoverOrchestrator {
        self.orchestrator_with(StaticApprovalGate::approve(), fast_config())
    }

    pub fn orchestrator_with(
        &self,
        gate: impl ApprovalGate + 'static,
        config: FailoverConfig,
    ) -> FailoverOrchestrator {
        self.orchestrator_on(
            ControlPlane::uniform(Arc::new(self.control_plane.clone())),
            gate,
            config,
        )
    }

    /// Orchestrator whose ledger writes go through `ledger` instead of the shared one
    pub fn orchestrator_with_ledger(&self, ledger: Arc<dyn RunLedger>) -> FailoverOrchestrator {
        FailoverOrchestrator::new(
            ControlPlane::uniform(Arc::new(self.control_plane.clone())),
            ledger,
            Arc::new(self.lock.clone()),
            Arc::new(StaticApprovalGate::approve()),
            &fast_config(),
        )
    }

    pub fn orchestrator_on(
        &self,
        control_plane: ControlPlane,
        gate: impl ApprovalGate + 'static,
        config: FailoverConfig,
    ) -> FailoverOrchestrator {
        FailoverOrchestrator::new(
            control_plane,
            Arc::new(self.ledger.clone()),
            Arc::new(self.lock.clone()),
            Arc::new(gate),
            &config,
        )
    }
}

/// Ledger that refuses writes matching a predicate while armed, as a full disk
/// or a dropped database connection would
#[derive(Clone)]
pub struct FailingLedger {
    inner: InMemoryRunLedger,
    armed: Arc<AtomicBool>,
    refuse: fn(&FailoverRun) -> bool,
}

impl FailingLedger {
    pub fn new(inner: InMemoryRunLedger, refuse: fn(&FailoverRun) -> bool) -> Self {
        Self {
            inner,
            armed: Arc::new(AtomicBool::new(true)),
            refuse,
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl RunLedger for FailingLedger {
    async fn persist(&self, run: &FailoverRun) -> FailoverResult<()> {
        if self.armed.load(Ordering::SeqCst) && (self.refuse)(run) {
            return Err(FailoverError::Ledger("write refused".to_string()));
        }
        self.inner.persist(run).await
    }

    async fn load(&self, run_id: Uuid) -> FailoverResult<FailoverRun> {
        self.inner.load(run_id).await
    }

    async fn runs_for_plan(&self, plan_key: Uuid) -> FailoverResult<Vec<FailoverRun>> {
        self.inner.runs_for_plan(plan_key).await
    }
}
