// State machine module for failover runs
//
// A run moves PendingApproval -> Approved -> Running -> Completed, or to Failed
// from any non-terminal state. Step ordering within Running is enforced by
// FailoverRun::record_step.

pub mod events;
pub mod guards;
pub mod run_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use events::{FailureKind, RunEvent, RunFailure};
pub use guards::StateGuard;
pub use run_state_machine::RunStateMachine;
pub use states::RunStatus;
