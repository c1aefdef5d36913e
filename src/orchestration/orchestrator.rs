//! # Failover Orchestrator
//!
//! Drives one [`FailoverRun`] from submission to a terminal status:
//!
//! 1. validate the plan (forced detaches need an unreachable source region)
//! 2. persist the run and wait for approval
//! 3. take the per-global-cluster lock
//! 4. execute the four steps strictly in order, each guarded by a state check
//!    and retried with bounded backoff
//! 5. persist the terminal run and release the lock
//!
//! Every status change and step result is persisted before the next action, so
//! [`FailoverOrchestrator::resume`] can pick an interrupted run back up from
//! its first unrecorded step.

use super::lock::FailoverLock;
use super::retry::RetryPolicy;
use crate::adapters::ControlPlane;
use crate::approval::{ApprovalDecision, ApprovalGate, ApprovalRequest};
use crate::config::FailoverConfig;
use crate::constants::events;
use crate::error::{AdapterResult, FailoverError, FailoverResult};
use crate::ledger::RunLedger;
use crate::logging::{log_run_operation, log_step_operation};
use crate::models::{DetachMode, FailoverPlan, FailoverRun, StepKind, StepOutcome, StepResult};
use crate::state_machine::{FailureKind, RunEvent, RunFailure, RunStateMachine, RunStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What a single step attempt did
#[derive(Debug)]
enum StepAction {
    /// The desired end state already held
    AlreadyApplied(String),
    /// The mutation was issued and accepted
    Applied(String),
}

pub struct FailoverOrchestrator {
    control_plane: ControlPlane,
    ledger: Arc<dyn RunLedger>,
    lock: Arc<dyn FailoverLock>,
    approval_gate: Arc<dyn ApprovalGate>,
    retry_policy: RetryPolicy,
    approval_timeout: Option<Duration>,
    invalidation_paths: Vec<String>,
    cancellation: CancellationToken,
}

impl FailoverOrchestrator {
    pub fn new(
        control_plane: ControlPlane,
        ledger: Arc<dyn RunLedger>,
        lock: Arc<dyn FailoverLock>,
        approval_gate: Arc<dyn ApprovalGate>,
        config: &FailoverConfig,
    ) -> Self {
        Self {
            control_plane,
            ledger,
            lock,
            approval_gate,
            retry_policy: RetryPolicy::new(config.retry.clone()),
            approval_timeout: config.approval.timeout(),
            invalidation_paths: config.edge.invalidation_paths.clone(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Share a cancellation token with the caller (e.g. a Ctrl-C handler)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn ledger(&self) -> &Arc<dyn RunLedger> {
        &self.ledger
    }

    /// Run a new failover for `plan`
    ///
    /// Returns the terminal run when steps were executed, whether it completed
    /// or a step failed. Denial, approval timeout, lock contention and
    /// cancellation return an error after the run was persisted as `Failed`;
    /// an invalid plan returns an error before anything is persisted.
    #[instrument(skip(self, plan), fields(global_cluster_id = %plan.global_cluster_id))]
    pub async fn execute(&self, plan: FailoverPlan) -> FailoverResult<FailoverRun> {
        plan.validate()?;
        self.validate_detach_mode(&plan).await?;

        let run = FailoverRun::new(plan);
        self.ledger.persist(&run).await?;
        log_run_operation(
            events::RUN_SUBMITTED,
            run.id,
            &run.plan.global_cluster_id,
            &run.status.to_string(),
            Some(&format!(
                "{} -> {} ({})",
                run.plan.source_region, run.plan.destination_region, run.plan.detach_mode
            )),
        );

        self.drive(run).await
    }

    /// Continue a run that has not reached a terminal status
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: Uuid) -> FailoverResult<FailoverRun> {
        let run = self.ledger.load(run_id).await?;
        if run.is_terminal() {
            return Err(FailoverError::RunAlreadyTerminal {
                run_id,
                status: run.status.to_string(),
            });
        }

        log_run_operation(
            events::RUN_RESUMED,
            run.id,
            &run.plan.global_cluster_id,
            &run.status.to_string(),
            run.next_step().map(|step| step.to_string()).as_deref(),
        );

        self.drive(run).await
    }

    /// A forced detach is only legitimate while the source region is down
    async fn validate_detach_mode(&self, plan: &FailoverPlan) -> FailoverResult<()> {
        if plan.detach_mode != DetachMode::Unmanaged {
            return Ok(());
        }

        if self.control_plane.probe.is_reachable(&plan.source_region).await? {
            return Err(FailoverError::InvalidPlan(format!(
                "unmanaged detach requires source region {} to be unreachable, but its control plane responded",
                plan.source_region
            )));
        }

        warn!(
            source_region = %plan.source_region,
            "Source region unreachable; forced (unmanaged) detach permitted"
        );
        Ok(())
    }

    async fn drive(&self, mut run: FailoverRun) -> FailoverResult<FailoverRun> {
        if run.status == RunStatus::PendingApproval {
            self.await_approval(&mut run).await?;
        }

        let key = run.plan.global_cluster_id.clone();
        if !self.lock.try_acquire(&key, run.id).await? {
            warn!(run_id = %run.id, global_cluster_id = %key, "Failover lock held by another run");
            if run.status == RunStatus::Approved {
                self.fail_run(
                    &mut run,
                    RunFailure::new(
                        FailureKind::ConcurrentFailoverInProgress,
                        format!("another run holds the failover lock for {key}"),
                    ),
                )
                .await?;
            }
            return Err(FailoverError::ConcurrentFailoverInProgress {
                global_cluster_id: key,
                run_id: run.id,
            });
        }
        debug!(run_id = %run.id, global_cluster_id = %key, "Acquired failover lock");

        let outcome = self.run_locked(&mut run).await;

        if let Err(e) = self.lock.release(&key, run.id).await {
            warn!(run_id = %run.id, error = %e, "Failed to release failover lock");
        }

        outcome.map(|()| run)
    }

    async fn await_approval(&self, run: &mut FailoverRun) -> FailoverResult<()> {
        let request = ApprovalRequest {
            run_id: run.id,
            global_cluster_id: run.plan.global_cluster_id.clone(),
            context: run.plan.approval_context(),
        };
        info!(run_id = %run.id, context = %request.context, "Awaiting approval");

        let decision = async {
            let pending = self.approval_gate.await_decision(&request);
            match self.approval_timeout {
                Some(limit) => tokio::time::timeout(limit, pending).await.ok(),
                None => Some(pending.await),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => {
                return self.cancel_run(run, "cancelled while awaiting approval").await;
            }
            outcome = decision => outcome,
        };

        match outcome {
            None => {
                let timeout_seconds = self.approval_timeout.map_or(0, |limit| limit.as_secs());
                self.fail_run(
                    run,
                    RunFailure::new(
                        FailureKind::ApprovalTimeout,
                        format!("no decision within {timeout_seconds}s"),
                    ),
                )
                .await?;
                Err(FailoverError::ApprovalTimeout {
                    run_id: run.id,
                    timeout_seconds,
                })
            }
            Some(Err(e)) => {
                warn!(run_id = %run.id, error = %e, "Approval gate failed; run left pending");
                Err(e)
            }
            Some(Ok(ApprovalDecision::Denied)) => {
                log_run_operation(
                    events::RUN_DENIED,
                    run.id,
                    &run.plan.global_cluster_id,
                    &run.status.to_string(),
                    None,
                );
                self.fail_run(
                    run,
                    RunFailure::new(FailureKind::ApprovalDenied, "approver denied the failover"),
                )
                .await?;
                Err(FailoverError::ApprovalDenied { run_id: run.id })
            }
            Some(Ok(ApprovalDecision::Approved)) => {
                RunStateMachine::transition(run, RunEvent::Approve)?;
                self.ledger.persist(run).await?;
                log_run_operation(
                    events::RUN_APPROVED,
                    run.id,
                    &run.plan.global_cluster_id,
                    &run.status.to_string(),
                    None,
                );
                Ok(())
            }
        }
    }

    /// Execute remaining steps while holding the lock
    async fn run_locked(&self, run: &mut FailoverRun) -> FailoverResult<()> {
        if run.status == RunStatus::Approved {
            if self.cancellation.is_cancelled() {
                return self.cancel_run(run, "cancelled before execution started").await;
            }
            RunStateMachine::transition(run, RunEvent::Start)?;
            self.ledger.persist(run).await?;
            log_run_operation(
                events::RUN_STARTED,
                run.id,
                &run.plan.global_cluster_id,
                &run.status.to_string(),
                None,
            );
        }

        // A failed step persisted without the terminal status that follows it
        if let Some(failed) = run.failed_step() {
            let (step, detail) = (failed.step_kind, failed.detail.clone());
            warn!(run_id = %run.id, step = %step, "Run already stopped at a failed step; settling it as failed");
            self.fail_run(run, RunFailure::step_failed(step, detail)).await?;
            return Ok(());
        }

        while let Some(step) = run.next_step() {
            if self.cancellation.is_cancelled() {
                return self
                    .cancel_run(run, &format!("cancelled before {step}"))
                    .await;
            }

            let invalidation_covered = step == StepKind::InvalidateEdgeCache
                && self.invalidation_already_covered(run).await?;

            let result = self.execute_step(run, step, invalidation_covered).await;
            let failed = result.outcome == StepOutcome::Failed;
            let detail = result.detail.clone();

            run.record_step(result)?;
            self.ledger.persist(run).await?;

            if failed {
                self.fail_run(run, RunFailure::step_failed(step, detail)).await?;
                return Ok(());
            }
        }

        RunStateMachine::transition(run, RunEvent::Complete)?;
        self.ledger.persist(run).await?;
        log_run_operation(
            events::RUN_COMPLETED,
            run.id,
            &run.plan.global_cluster_id,
            &run.status.to_string(),
            Some(&format!("{:?}", run.outcomes())),
        );
        Ok(())
    }

    /// Invalidation may be skipped only when the origin switch was already in
    /// place for this run and an earlier run of the same plan already settled
    /// the invalidation
    async fn invalidation_already_covered(&self, run: &FailoverRun) -> FailoverResult<bool> {
        let origin_was_in_place = run
            .step_result(StepKind::SwitchEdgeOrigin)
            .is_some_and(|result| result.outcome == StepOutcome::Skipped);
        if !origin_was_in_place {
            return Ok(false);
        }

        let history = self.ledger.runs_for_plan(run.plan_key).await?;
        Ok(history.iter().any(|prior| {
            prior.id != run.id
                && prior.started_at <= run.started_at
                && prior
                    .step_result(StepKind::InvalidateEdgeCache)
                    .is_some_and(|result| result.outcome.allows_progress())
        }))
    }

    /// Run one step to a settled result, retrying per the policy
    async fn execute_step(
        &self,
        run: &FailoverRun,
        step: StepKind,
        invalidation_covered: bool,
    ) -> StepResult {
        let step_name = step.to_string();
        let mut attempt = 0;

        loop {
            attempt += 1;
            log_step_operation(
                events::STEP_ATTEMPTED,
                run.id,
                &step_name,
                attempt,
                "running",
                None,
            );

            match self.attempt_step(&run.plan, step, invalidation_covered).await {
                Ok(StepAction::AlreadyApplied(detail)) => {
                    log_step_operation(
                        events::STEP_SKIPPED,
                        run.id,
                        &step_name,
                        attempt,
                        "skipped",
                        Some(&detail),
                    );
                    return StepResult::new(step, attempt, StepOutcome::Skipped, detail);
                }
                Ok(StepAction::Applied(detail)) => {
                    log_step_operation(
                        events::STEP_SUCCEEDED,
                        run.id,
                        &step_name,
                        attempt,
                        "succeeded",
                        Some(&detail),
                    );
                    return StepResult::new(step, attempt, StepOutcome::Succeeded, detail);
                }
                Err(error) => {
                    if !self.retry_policy.should_retry(attempt, &error) {
                        let detail = error.to_string();
                        log_step_operation(
                            events::STEP_FAILED,
                            run.id,
                            &step_name,
                            attempt,
                            "failed",
                            Some(&detail),
                        );
                        return StepResult::new(step, attempt, StepOutcome::Failed, detail);
                    }

                    let delay = self.retry_policy.backoff_delay(attempt);
                    warn!(
                        run_id = %run.id,
                        step = %step_name,
                        attempt = attempt,
                        transient = error.is_transient(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Step attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Check current state, then mutate only if the end state does not hold
    async fn attempt_step(
        &self,
        plan: &FailoverPlan,
        step: StepKind,
        invalidation_covered: bool,
    ) -> AdapterResult<StepAction> {
        match step {
            StepKind::DetachGlobalCluster => {
                let topology = &self.control_plane.topology;
                if !topology
                    .is_attached(&plan.global_cluster_id, &plan.source_cluster_id)
                    .await?
                {
                    return Ok(StepAction::AlreadyApplied(format!(
                        "{} is not attached to {}",
                        plan.source_cluster_id, plan.global_cluster_id
                    )));
                }
                topology
                    .detach(&plan.global_cluster_id, &plan.source_cluster_id, plan.detach_mode)
                    .await?;
                Ok(StepAction::Applied(format!(
                    "detached {} from {} ({})",
                    plan.source_cluster_id, plan.global_cluster_id, plan.detach_mode
                )))
            }
            StepKind::RepointProxyTargets => {
                let proxy = &self.control_plane.proxy;
                let targets = proxy
                    .current_targets(&plan.target_proxy_name, &plan.proxy_target_group_name)
                    .await?;
                if targets.len() == 1 && targets.contains(&plan.target_cluster_id) {
                    return Ok(StepAction::AlreadyApplied(format!(
                        "{}/{} already targets {}",
                        plan.target_proxy_name, plan.proxy_target_group_name, plan.target_cluster_id
                    )));
                }
                proxy
                    .rebind(
                        &plan.target_proxy_name,
                        &plan.proxy_target_group_name,
                        &plan.target_cluster_id,
                    )
                    .await?;
                Ok(StepAction::Applied(format!(
                    "rebound {}/{} from {:?} to {}",
                    plan.target_proxy_name,
                    plan.proxy_target_group_name,
                    targets,
                    plan.target_cluster_id
                )))
            }
            StepKind::SwitchEdgeOrigin => {
                let edge = &self.control_plane.edge;
                let current = edge
                    .current_origin_domain(&plan.edge_distribution_id, &plan.edge_origin_id)
                    .await?;
                if current == plan.new_origin_domain_name {
                    return Ok(StepAction::AlreadyApplied(format!(
                        "origin {} already routes to {}",
                        plan.edge_origin_id, current
                    )));
                }
                edge.update_origin(
                    &plan.edge_distribution_id,
                    &plan.edge_origin_id,
                    &plan.new_origin_domain_name,
                )
                .await?;
                Ok(StepAction::Applied(format!(
                    "origin {} switched from {} to {}",
                    plan.edge_origin_id, current, plan.new_origin_domain_name
                )))
            }
            StepKind::InvalidateEdgeCache => {
                if invalidation_covered {
                    return Ok(StepAction::AlreadyApplied(
                        "origin unchanged and an earlier run already invalidated the cache"
                            .to_string(),
                    ));
                }
                self.control_plane
                    .edge
                    .invalidate(&plan.edge_distribution_id, &self.invalidation_paths)
                    .await?;
                Ok(StepAction::Applied(format!(
                    "invalidated {} on {}",
                    self.invalidation_paths.join(","),
                    plan.edge_distribution_id
                )))
            }
        }
    }

    async fn fail_run(&self, run: &mut FailoverRun, failure: RunFailure) -> FailoverResult<()> {
        let detail = format!("{}: {}", failure.kind, failure.detail);
        RunStateMachine::transition(run, RunEvent::Fail(failure))?;
        self.ledger.persist(run).await?;
        log_run_operation(
            events::RUN_FAILED,
            run.id,
            &run.plan.global_cluster_id,
            &run.status.to_string(),
            Some(&detail),
        );
        Ok(())
    }

    async fn cancel_run<T>(&self, run: &mut FailoverRun, detail: &str) -> FailoverResult<T> {
        self.fail_run(run, RunFailure::new(FailureKind::Cancelled, detail))
            .await?;
        Err(FailoverError::Cancelled { run_id: run.id })
    }
}

impl std::fmt::Debug for FailoverOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverOrchestrator")
            .field("retry_policy", &self.retry_policy)
            .field("approval_timeout", &self.approval_timeout)
            .field("invalidation_paths", &self.invalidation_paths)
            .finish_non_exhaustive()
    }
}
