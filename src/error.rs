//! Error types for the failover orchestrator.
//!

use crate::models::StepKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a control-plane adapter call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AdapterError {
    /// The service could not be reached or answered with a transient failure
    #[error("Adapter unavailable: {0}")]
    Unavailable(String),
    /// The service refused the operation (e.g. a precondition was not met)
    #[error("Adapter rejected operation: {0}")]
    Rejected(String),
}

impl AdapterError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Transient failures are retried up to the full attempt budget
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FailoverError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
    #[error("Approval denied for run {run_id}")]
    ApprovalDenied { run_id: Uuid },
    #[error("Approval for run {run_id} timed out after {timeout_seconds}s")]
    ApprovalTimeout { run_id: Uuid, timeout_seconds: u64 },
    #[error("Failover already in progress for global cluster {global_cluster_id} (run {run_id} rejected)")]
    ConcurrentFailoverInProgress {
        global_cluster_id: String,
        run_id: Uuid,
    },
    #[error("Run {run_id} was cancelled")]
    Cancelled { run_id: Uuid },
    #[error("Run {0} not found in ledger")]
    RunNotFound(Uuid),
    #[error("Run {run_id} is already {status}")]
    RunAlreadyTerminal { run_id: Uuid, status: String },
    #[error("Invalid run transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },
    #[error("Step {step} could not run: {reason}")]
    StepOrdering { step: StepKind, reason: String },
    #[error("Ledger error: {0}")]
    Ledger(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

impl FailoverError {
    /// Run the error is attached to, when the run was persisted before failing
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Self::ApprovalDenied { run_id }
            | Self::ApprovalTimeout { run_id, .. }
            | Self::ConcurrentFailoverInProgress { run_id, .. }
            | Self::Cancelled { run_id }
            | Self::RunAlreadyTerminal { run_id, .. } => Some(*run_id),
            Self::RunNotFound(run_id) => Some(*run_id),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FailoverError {
    fn from(error: serde_json::Error) -> Self {
        FailoverError::Ledger(format!("JSON serialization error: {error}"))
    }
}

impl From<sqlx::Error> for FailoverError {
    fn from(error: sqlx::Error) -> Self {
        FailoverError::Ledger(error.to_string())
    }
}

impl From<std::io::Error> for FailoverError {
    fn from(error: std::io::Error) -> Self {
        FailoverError::Ledger(format!("I/O error: {error}"))
    }
}

impl From<config::ConfigError> for FailoverError {
    fn from(error: config::ConfigError) -> Self {
        FailoverError::Configuration(error.to_string())
    }
}

pub type FailoverResult<T> = Result<T, FailoverError>;
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_classification() {
        assert!(AdapterError::unavailable("timeout").is_transient());
        assert!(!AdapterError::rejected("precondition").is_transient());
    }

    #[test]
    fn test_run_id_extraction() {
        let run_id = Uuid::new_v4();
        let err = FailoverError::ConcurrentFailoverInProgress {
            global_cluster_id: "gc-1".to_string(),
            run_id,
        };
        assert_eq!(err.run_id(), Some(run_id));
        assert_eq!(FailoverError::InvalidPlan("x".to_string()).run_id(), None);
    }

    #[test]
    fn test_error_messages() {
        let err = FailoverError::Adapter(AdapterError::rejected("cluster busy"));
        assert_eq!(err.to_string(), "Adapter rejected operation: cluster busy");
    }
}
