use super::{
    events::RunEvent,
    guards::{AllStepsSettledGuard, FailureMatchesStateGuard, StateGuard},
    states::RunStatus,
};
use crate::error::{FailoverError, FailoverResult};
use crate::models::FailoverRun;
use chrono::Utc;
use tracing::debug;

/// Lifecycle state machine for a failover run
///
/// Owns no state of its own: it validates and applies transitions to the run it
/// is handed, stamping the lifecycle timestamps as it goes.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStateMachine;

impl RunStateMachine {
    /// Apply `event` to `run`, returning the new status
    pub fn transition(run: &mut FailoverRun, event: RunEvent) -> FailoverResult<RunStatus> {
        let current_state = run.status;
        let target_state = Self::determine_target_state(current_state, &event)?;

        Self::check_guards(run, target_state, &event)?;

        let now = Utc::now();
        match &event {
            RunEvent::Approve => run.approved_at = Some(now),
            RunEvent::Fail(failure) => run.failure = Some(failure.clone()),
            RunEvent::Start | RunEvent::Complete => {}
        }
        if target_state.is_terminal() {
            run.finished_at = Some(now);
        }
        run.status = target_state;
        run.updated_at = now;

        debug!(
            run_id = %run.id,
            from = %current_state,
            to = %target_state,
            event = event.event_type(),
            "Run state transition"
        );

        Ok(target_state)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        current_state: RunStatus,
        event: &RunEvent,
    ) -> FailoverResult<RunStatus> {
        let target = match (current_state, event) {
            (RunStatus::PendingApproval, RunEvent::Approve) => RunStatus::Approved,
            (RunStatus::Approved, RunEvent::Start) => RunStatus::Running,
            (RunStatus::Running, RunEvent::Complete) => RunStatus::Completed,

            (RunStatus::PendingApproval, RunEvent::Fail(_))
            | (RunStatus::Approved, RunEvent::Fail(_))
            | (RunStatus::Running, RunEvent::Fail(_)) => RunStatus::Failed,

            (from_state, event) => {
                return Err(FailoverError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    fn check_guards(
        run: &FailoverRun,
        target_state: RunStatus,
        event: &RunEvent,
    ) -> FailoverResult<()> {
        match target_state {
            RunStatus::Completed => AllStepsSettledGuard.check(run),
            RunStatus::Failed => FailureMatchesStateGuard { event }.check(run),
            _ => Ok(()),
        }
    }
}
