//! # Failover Run
//!
//! One execution of a [`FailoverPlan`]. The run is the unit the ledger persists:
//! it carries the plan, the lifecycle status and the append-only step ledger.
//! Status changes go through [`crate::state_machine::RunStateMachine`]; step
//! results go through [`FailoverRun::record_step`], which enforces ordering.

use super::plan::FailoverPlan;
use super::step::{StepKind, StepOutcome, StepResult};
use crate::error::{FailoverError, FailoverResult};
use crate::state_machine::{RunFailure, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverRun {
    pub id: Uuid,
    pub plan_key: Uuid,
    pub plan: FailoverPlan,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FailoverRun {
    /// Create a run awaiting approval
    pub fn new(plan: FailoverPlan) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan_key: plan.plan_key(),
            plan,
            status: RunStatus::PendingApproval,
            steps: Vec::new(),
            failure: None,
            started_at: now,
            approved_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step_result(&self, kind: StepKind) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step_kind == kind)
    }

    /// The step whose failure ended execution, if any
    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps
            .iter()
            .find(|result| !result.outcome.allows_progress())
    }

    /// First step without a recorded result
    ///
    /// `None` once all four have settled or once any step has failed: nothing
    /// may run after a failed step, even if the run itself was never marked
    /// `Failed`.
    pub fn next_step(&self) -> Option<StepKind> {
        if self.failed_step().is_some() {
            return None;
        }
        StepKind::ORDER
            .into_iter()
            .find(|kind| self.step_result(*kind).is_none())
    }

    /// Append a step result
    ///
    /// Results must arrive in execution order, one per step, and only while the
    /// run is executing. A failed step closes the ledger to later steps.
    pub fn record_step(&mut self, result: StepResult) -> FailoverResult<()> {
        let step = result.step_kind;
        let reject = |reason: String| Err(FailoverError::StepOrdering { step, reason });

        if !self.status.is_active() {
            return reject(format!("run {} is {}, not running", self.id, self.status));
        }
        if let Some(failed) = self.failed_step() {
            return reject(format!("{} already failed", failed.step_kind));
        }
        if self.step_result(step).is_some() {
            return reject("already recorded".to_string());
        }
        if let Some(predecessor) = step.predecessor() {
            if self.step_result(predecessor).is_none() {
                return reject(format!("{predecessor} has not settled"));
            }
        }

        self.steps.push(result);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether every step settled with an outcome that permits completion
    pub fn all_steps_settled(&self) -> bool {
        StepKind::ORDER.iter().all(|kind| {
            self.step_result(*kind)
                .is_some_and(|result| result.outcome.allows_progress())
        })
    }

    /// Step outcomes in execution order, for audit output and assertions
    pub fn outcomes(&self) -> Vec<(StepKind, StepOutcome)> {
        self.steps
            .iter()
            .map(|result| (result.step_kind, result.outcome))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_plan as plan;

    fn running_run() -> FailoverRun {
        let mut run = FailoverRun::new(plan());
        run.status = RunStatus::Running;
        run
    }

    #[test]
    fn test_new_run_awaits_approval() {
        let run = FailoverRun::new(plan());
        assert_eq!(run.status, RunStatus::PendingApproval);
        assert_eq!(run.plan_key, run.plan.plan_key());
        assert_eq!(run.next_step(), Some(StepKind::DetachGlobalCluster));
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_record_step_requires_running() {
        let mut run = FailoverRun::new(plan());
        let result = StepResult::new(StepKind::DetachGlobalCluster, 1, StepOutcome::Succeeded, "");
        assert!(run.record_step(result).is_err());
        assert!(run.steps.is_empty());
    }

    #[test]
    fn test_record_step_enforces_order() {
        let mut run = running_run();
        let out_of_order = StepResult::new(StepKind::SwitchEdgeOrigin, 1, StepOutcome::Succeeded, "");
        assert!(matches!(
            run.record_step(out_of_order),
            Err(FailoverError::StepOrdering { .. })
        ));

        for kind in StepKind::ORDER {
            run.record_step(StepResult::new(kind, 1, StepOutcome::Skipped, "already applied"))
                .unwrap();
        }
        assert!(run.all_steps_settled());
        assert_eq!(run.next_step(), None);

        let duplicate = StepResult::new(StepKind::InvalidateEdgeCache, 1, StepOutcome::Skipped, "");
        assert!(run.record_step(duplicate).is_err());
    }

    #[test]
    fn test_failed_step_closes_ledger() {
        let mut run = running_run();
        run.record_step(StepResult::new(
            StepKind::DetachGlobalCluster,
            5,
            StepOutcome::Failed,
            "unavailable",
        ))
        .unwrap();

        let next = StepResult::new(StepKind::RepointProxyTargets, 1, StepOutcome::Succeeded, "");
        assert!(run.record_step(next).is_err());
        assert!(!run.all_steps_settled());
        assert_eq!(run.outcomes().len(), 1);
        assert_eq!(run.next_step(), None);
        assert_eq!(
            run.failed_step().map(|result| result.step_kind),
            Some(StepKind::DetachGlobalCluster)
        );
    }

    #[test]
    fn test_no_next_step_after_mid_run_failure() {
        let mut run = running_run();
        run.record_step(StepResult::new(
            StepKind::DetachGlobalCluster,
            1,
            StepOutcome::Succeeded,
            "",
        ))
        .unwrap();
        run.record_step(StepResult::new(
            StepKind::RepointProxyTargets,
            2,
            StepOutcome::Failed,
            "rejected",
        ))
        .unwrap();

        assert_eq!(run.next_step(), None);
        assert!(!run.all_steps_settled());
    }
}
