use super::events::{FailureKind, RunEvent};
use super::states::RunStatus;
use crate::error::{FailoverError, FailoverResult};
use crate::models::FailoverRun;

/// Trait for implementing state transition guards
pub trait StateGuard<T> {
    /// Check if a transition is allowed
    fn check(&self, entity: &T) -> FailoverResult<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard to check that every step settled before a run completes
pub struct AllStepsSettledGuard;

impl StateGuard<FailoverRun> for AllStepsSettledGuard {
    fn check(&self, run: &FailoverRun) -> FailoverResult<()> {
        if run.all_steps_settled() {
            return Ok(());
        }

        let pending = run
            .next_step()
            .map(|step| step.to_string())
            .unwrap_or_else(|| "a failed step".to_string());
        Err(FailoverError::InvalidTransition {
            from: run.status.to_string(),
            event: format!("complete (blocked by {pending})"),
        })
    }

    fn description(&self) -> &'static str {
        "All steps must have succeeded or been skipped"
    }
}

/// Guard to check a failure kind is plausible for the state it fails from
///
/// Approval failures only happen before approval, lock contention only after
/// approval, step failures only while running. Cancellation is always allowed.
pub struct FailureMatchesStateGuard<'a> {
    pub event: &'a RunEvent,
}

impl StateGuard<FailoverRun> for FailureMatchesStateGuard<'_> {
    fn check(&self, run: &FailoverRun) -> FailoverResult<()> {
        let Some(failure) = self.event.failure() else {
            return Ok(());
        };

        let allowed = match failure.kind {
            FailureKind::ApprovalDenied | FailureKind::ApprovalTimeout => {
                run.status == RunStatus::PendingApproval
            }
            FailureKind::ConcurrentFailoverInProgress => run.status == RunStatus::Approved,
            FailureKind::StepFailed => run.status == RunStatus::Running,
            FailureKind::Cancelled => !run.status.is_terminal(),
        };

        if allowed {
            Ok(())
        } else {
            Err(FailoverError::InvalidTransition {
                from: run.status.to_string(),
                event: format!("fail({})", failure.kind),
            })
        }
    }

    fn description(&self) -> &'static str {
        "Failure kind must match the state the run fails from"
    }
}
