use crate::models::StepKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ApprovalDenied,
    ApprovalTimeout,
    ConcurrentFailoverInProgress,
    Cancelled,
    StepFailed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApprovalDenied => write!(f, "approval_denied"),
            Self::ApprovalTimeout => write!(f, "approval_timeout"),
            Self::ConcurrentFailoverInProgress => write!(f, "concurrent_failover_in_progress"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::StepFailed => write!(f, "step_failed"),
        }
    }
}

/// Terminal failure record kept on the run for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepKind>,
    pub detail: String,
}

impl RunFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            step: None,
            detail: detail.into(),
        }
    }

    pub fn step_failed(step: StepKind, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::StepFailed,
            step: Some(step),
            detail: detail.into(),
        }
    }
}

/// Events that can trigger run state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunEvent {
    /// The approval gate authorized the run
    Approve,
    /// The global cluster lock was acquired
    Start,
    /// Every step settled without failure
    Complete,
    /// The run ended without completing
    Fail(RunFailure),
}

impl RunEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            Self::Fail(failure) => Some(failure),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Fail(_))
    }
}
