mod common;

use async_trait::async_trait;
use common::{fast_config, Harness};
use failover_core::adapters::{
    ControlPlane, ControlPlaneCall, DatabaseTopology, InMemoryControlPlane, Operation, RegionProbe,
};
use failover_core::approval::StaticApprovalGate;
use failover_core::error::{AdapterResult, FailoverError, FailoverResult};
use failover_core::ledger::RunLedger;
use failover_core::models::{DetachMode, StepKind, StepOutcome};
use failover_core::state_machine::{FailureKind, RunStatus};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[tokio::test]
async fn test_approved_plan_completes_all_steps() {
    let harness = Harness::new();
    let run = harness.orchestrator().execute(harness.plan.clone()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.outcomes(),
        vec![
            (StepKind::DetachGlobalCluster, StepOutcome::Succeeded),
            (StepKind::RepointProxyTargets, StepOutcome::Succeeded),
            (StepKind::SwitchEdgeOrigin, StepOutcome::Succeeded),
            (StepKind::InvalidateEdgeCache, StepOutcome::Succeeded),
        ]
    );
    assert!(run.failure.is_none());
    assert!(run.approved_at.is_some());
    assert!(run.finished_at.is_some());

    let cp = &harness.control_plane;
    assert_eq!(cp.global_cluster_members("gc-1"), set(&["c-dst"]));
    assert_eq!(cp.proxy_targets("proxy-dst", "default"), set(&["c-dst"]));
    assert_eq!(cp.origin_domain("dist-1", "origin1").as_deref(), Some("dst.example.com"));
    assert_eq!(
        cp.invalidations(),
        vec![("dist-1".to_string(), vec!["/*".to_string()])]
    );

    assert_eq!(harness.ledger.load(run.id).await.unwrap(), run);
}

#[tokio::test]
async fn test_rejected_repoint_fails_run_after_two_steps() {
    let harness = Harness::new();
    harness.control_plane.reject_always(Operation::Rebind);

    let run = harness.orchestrator().execute(harness.plan.clone()).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.outcomes(),
        vec![
            (StepKind::DetachGlobalCluster, StepOutcome::Succeeded),
            (StepKind::RepointProxyTargets, StepOutcome::Failed),
        ]
    );
    assert_eq!(run.steps[1].attempt, 2);

    let failure = run.failure.clone().unwrap();
    assert_eq!(failure.kind, FailureKind::StepFailed);
    assert_eq!(failure.step, Some(StepKind::RepointProxyTargets));

    let later_steps: Vec<ControlPlaneCall> = harness
        .control_plane
        .calls()
        .into_iter()
        .filter(|call| {
            matches!(
                call.operation(),
                Operation::CurrentOriginDomain | Operation::UpdateOrigin | Operation::Invalidate
            )
        })
        .collect();
    assert!(later_steps.is_empty());
}

#[tokio::test]
async fn test_repoint_never_precedes_detach() {
    let harness = Harness::new();
    harness.control_plane.reject_always(Operation::Detach);

    let run = harness.orchestrator().execute(harness.plan.clone()).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.steps.len(), 1);
    assert!(harness
        .control_plane
        .calls()
        .iter()
        .all(|call| call.operation() != Operation::Rebind));

    let healthy = Harness::new();
    healthy.orchestrator().execute(healthy.plan.clone()).await.unwrap();
    let operations: Vec<Operation> = healthy
        .control_plane
        .mutation_calls()
        .iter()
        .map(ControlPlaneCall::operation)
        .collect();
    assert_eq!(
        operations,
        vec![
            Operation::Detach,
            Operation::Rebind,
            Operation::UpdateOrigin,
            Operation::Invalidate
        ]
    );
}

#[tokio::test]
async fn test_second_execution_skips_everything() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator();
    let first = orchestrator.execute(harness.plan.clone()).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);

    harness.control_plane.clear_calls();
    let second = orchestrator.execute(harness.plan.clone()).await.unwrap();

    assert_eq!(second.status, RunStatus::Completed);
    assert_ne!(second.id, first.id);
    assert_eq!(second.plan_key, first.plan_key);
    assert!(second
        .steps
        .iter()
        .all(|step| step.outcome == StepOutcome::Skipped));
    assert_eq!(second.steps.len(), 4);
    assert!(harness.control_plane.mutation_calls().is_empty());

    let history = harness.ledger.runs_for_plan(first.plan_key).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_new_run_after_failure_resumes_at_failed_step() {
    let harness = Harness::new();
    harness.control_plane.reject_always(Operation::UpdateOrigin);
    let orchestrator = harness.orchestrator();

    let failed = orchestrator.execute(harness.plan.clone()).await.unwrap();
    assert_eq!(failed.status, RunStatus::Failed);
    assert_eq!(
        failed.outcomes(),
        vec![
            (StepKind::DetachGlobalCluster, StepOutcome::Succeeded),
            (StepKind::RepointProxyTargets, StepOutcome::Succeeded),
            (StepKind::SwitchEdgeOrigin, StepOutcome::Failed),
        ]
    );

    harness.control_plane.heal();
    harness.control_plane.clear_calls();
    let retried = orchestrator.execute(harness.plan.clone()).await.unwrap();

    assert_eq!(retried.status, RunStatus::Completed);
    assert_eq!(
        retried.outcomes(),
        vec![
            (StepKind::DetachGlobalCluster, StepOutcome::Skipped),
            (StepKind::RepointProxyTargets, StepOutcome::Skipped),
            (StepKind::SwitchEdgeOrigin, StepOutcome::Succeeded),
            (StepKind::InvalidateEdgeCache, StepOutcome::Succeeded),
        ]
    );
    assert_eq!(harness.control_plane.mutation_calls().len(), 2);
}

#[tokio::test]
async fn test_invalidation_not_skipped_without_prior_invalidation() {
    let harness = Harness::new();
    // Origin already switched out of band, but no run ever invalidated the cache
    harness
        .control_plane
        .seed_origin("dist-1", "origin1", "dst.example.com");

    let run = harness.orchestrator().execute(harness.plan.clone()).await.unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(
        run.step_result(StepKind::SwitchEdgeOrigin).unwrap().outcome,
        StepOutcome::Skipped
    );
    assert_eq!(
        run.step_result(StepKind::InvalidateEdgeCache).unwrap().outcome,
        StepOutcome::Succeeded
    );
    assert_eq!(harness.control_plane.invalidations().len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_for_same_global_cluster() {
    let harness = Harness::new();
    let slow_plane = harness
        .control_plane
        .clone()
        .with_latency(Duration::from_millis(20));
    let first = harness.orchestrator_on(
        ControlPlane::uniform(Arc::new(slow_plane.clone())),
        StaticApprovalGate::approve(),
        fast_config(),
    );
    let second = harness.orchestrator_on(
        ControlPlane::uniform(Arc::new(slow_plane)),
        StaticApprovalGate::approve(),
        fast_config(),
    );

    let (a, b) = tokio::join!(
        first.execute(harness.plan.clone()),
        second.execute(harness.plan.clone())
    );

    let results = [a, b];
    let completed: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let rejected: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].status, RunStatus::Completed);
    assert_eq!(rejected.len(), 1);
    let FailoverError::ConcurrentFailoverInProgress {
        global_cluster_id,
        run_id,
    } = rejected[0]
    else {
        panic!("expected lock contention, got {:?}", rejected[0]);
    };
    assert_eq!(global_cluster_id, "gc-1");

    let loser = harness.ledger.load(*run_id).await.unwrap();
    assert_eq!(loser.status, RunStatus::Failed);
    assert!(loser.steps.is_empty());
    assert_eq!(
        loser.failure.unwrap().kind,
        FailureKind::ConcurrentFailoverInProgress
    );

    // The lock is released once the winner is terminal
    let again = harness.orchestrator().execute(harness.plan.clone()).await.unwrap();
    assert_eq!(again.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_denied_approval_makes_no_adapter_calls() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator_with(StaticApprovalGate::deny(), fast_config());

    let err = orchestrator.execute(harness.plan.clone()).await.unwrap_err();
    let FailoverError::ApprovalDenied { run_id } = err else {
        panic!("expected denial, got {err:?}");
    };

    assert!(harness.control_plane.calls().is_empty());
    let run = harness.ledger.load(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.approved_at.is_none());
    assert_eq!(run.failure.unwrap().kind, FailureKind::ApprovalDenied);
}

#[tokio::test(start_paused = true)]
async fn test_approval_timeout() {
    let harness = Harness::new();
    let mut config = fast_config();
    config.approval.timeout_seconds = Some(60);
    let gate = StaticApprovalGate::approve().with_delay(Duration::from_secs(3600));
    let orchestrator = harness.orchestrator_with(gate, config);

    let err = orchestrator.execute(harness.plan.clone()).await.unwrap_err();
    let FailoverError::ApprovalTimeout {
        run_id,
        timeout_seconds,
    } = err
    else {
        panic!("expected timeout, got {err:?}");
    };
    assert_eq!(timeout_seconds, 60);

    assert!(harness.control_plane.calls().is_empty());
    let run = harness.ledger.load(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failure.unwrap().kind, FailureKind::ApprovalTimeout);
}

#[tokio::test]
async fn test_invalid_plan_persists_nothing() {
    let harness = Harness::new();
    let mut plan = harness.plan.clone();
    plan.destination_region = plan.source_region.clone();

    let err = harness.orchestrator().execute(plan).await.unwrap_err();
    assert!(matches!(err, FailoverError::InvalidPlan(_)));
    assert!(harness.ledger.is_empty());
    assert!(harness.control_plane.calls().is_empty());
}

#[tokio::test]
async fn test_unmanaged_detach_requires_unreachable_source() {
    let harness = Harness::new();
    let mut plan = harness.plan.clone();
    plan.detach_mode = DetachMode::Unmanaged;
    let orchestrator = harness.orchestrator();

    let err = orchestrator.execute(plan.clone()).await.unwrap_err();
    assert!(matches!(err, FailoverError::InvalidPlan(_)));
    assert!(harness.ledger.is_empty());

    harness.control_plane.mark_unreachable("us-east-1");
    let run = orchestrator.execute(plan).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(harness.control_plane.calls().contains(&ControlPlaneCall::Detach {
        global_cluster_id: "gc-1".to_string(),
        cluster_id: "c-src".to_string(),
        mode: DetachMode::Unmanaged,
    }));
}

/// Reachability check that cannot reach a verdict, as with a malformed endpoint
struct UnusableReachabilityCheck;

#[async_trait]
impl RegionProbe for UnusableReachabilityCheck {
    async fn is_reachable(&self, _region: &str) -> FailoverResult<bool> {
        Err(FailoverError::Configuration("endpoint cannot be parsed".to_string()))
    }
}

#[tokio::test]
async fn test_unmanaged_detach_refused_when_reachability_unknown() {
    let harness = Harness::new();
    harness.control_plane.mark_unreachable("us-east-1");
    let mut plan = harness.plan.clone();
    plan.detach_mode = DetachMode::Unmanaged;

    let shared = Arc::new(harness.control_plane.clone());
    let control_plane = ControlPlane::new(
        shared.clone(),
        shared.clone(),
        shared,
        Arc::new(UnusableReachabilityCheck),
    );
    let orchestrator =
        harness.orchestrator_on(control_plane, StaticApprovalGate::approve(), fast_config());

    let err = orchestrator.execute(plan).await.unwrap_err();
    assert!(matches!(err, FailoverError::Configuration(_)));
    assert!(harness.ledger.is_empty());
    assert!(harness.control_plane.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_approval() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    let orchestrator = harness.orchestrator().with_cancellation(token.clone());
    token.cancel();

    let err = orchestrator.execute(harness.plan.clone()).await.unwrap_err();
    let FailoverError::Cancelled { run_id } = err else {
        panic!("expected cancellation, got {err:?}");
    };

    assert!(harness.control_plane.calls().is_empty());
    let run = harness.ledger.load(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.failure.unwrap().kind, FailureKind::Cancelled);
}

/// Topology that requests cancellation as soon as the detach lands
struct CancelAfterDetach {
    inner: InMemoryControlPlane,
    token: CancellationToken,
}

#[async_trait]
impl DatabaseTopology for CancelAfterDetach {
    async fn is_attached(&self, global_cluster_id: &str, cluster_id: &str) -> AdapterResult<bool> {
        self.inner.is_attached(global_cluster_id, cluster_id).await
    }

    async fn detach(
        &self,
        global_cluster_id: &str,
        cluster_id: &str,
        mode: DetachMode,
    ) -> AdapterResult<()> {
        let result = self.inner.detach(global_cluster_id, cluster_id, mode).await;
        self.token.cancel();
        result
    }
}

#[tokio::test]
async fn test_cancellation_waits_for_running_step() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    let shared = Arc::new(harness.control_plane.clone());
    let control_plane = ControlPlane::new(
        Arc::new(CancelAfterDetach {
            inner: harness.control_plane.clone(),
            token: token.clone(),
        }),
        shared.clone(),
        shared.clone(),
        shared,
    );
    let orchestrator = harness
        .orchestrator_on(control_plane, StaticApprovalGate::approve(), fast_config())
        .with_cancellation(token);

    let err = orchestrator.execute(harness.plan.clone()).await.unwrap_err();
    let run_id = err.run_id().unwrap();
    assert!(matches!(err, FailoverError::Cancelled { .. }));

    let run = harness.ledger.load(run_id).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(
        run.outcomes(),
        vec![(StepKind::DetachGlobalCluster, StepOutcome::Succeeded)]
    );
    assert_eq!(run.failure.unwrap().kind, FailureKind::Cancelled);
    assert!(harness
        .control_plane
        .calls()
        .iter()
        .all(|call| call.operation() != Operation::Rebind));
}
