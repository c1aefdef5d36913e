use serde::{Deserialize, Serialize};
use std::fmt;

/// Failover run lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Plan submitted, waiting on the approval gate
    PendingApproval,
    /// Authorized, lock not yet acquired
    Approved,
    /// Holding the global cluster lock and executing steps
    Running,
    /// Every step succeeded or was already applied
    Completed,
    /// Denied, timed out, contended, cancelled or a step exhausted its retries
    Failed,
}

impl RunStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if adapter calls may be issued in this state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl Default for RunStatus {
    fn default() -> Self {
        Self::PendingApproval
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Approved => write!(f, "approved"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminal_check() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::PendingApproval.is_terminal());
        assert!(!RunStatus::Approved.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&RunStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
        assert_eq!(
            "completed".parse::<RunStatus>().unwrap(),
            RunStatus::Completed
        );
    }
}
