use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four failover steps, in the only order they may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Remove the source cluster from the global cluster (or force the break)
    DetachGlobalCluster,
    /// Rebind the destination proxy's target group to the promoted cluster
    RepointProxyTargets,
    /// Route the edge origin to the destination region
    SwitchEdgeOrigin,
    /// Purge cached responses that came from the old origin
    InvalidateEdgeCache,
}

impl StepKind {
    pub const ORDER: [StepKind; 4] = [
        Self::DetachGlobalCluster,
        Self::RepointProxyTargets,
        Self::SwitchEdgeOrigin,
        Self::InvalidateEdgeCache,
    ];

    /// Zero-based position in the execution order
    fn position(&self) -> usize {
        match self {
            Self::DetachGlobalCluster => 0,
            Self::RepointProxyTargets => 1,
            Self::SwitchEdgeOrigin => 2,
            Self::InvalidateEdgeCache => 3,
        }
    }

    /// Step that must have settled before this one may start
    pub fn predecessor(&self) -> Option<StepKind> {
        self.position()
            .checked_sub(1)
            .map(|index| Self::ORDER[index])
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DetachGlobalCluster => write!(f, "detach_global_cluster"),
            Self::RepointProxyTargets => write!(f, "repoint_proxy_targets"),
            Self::SwitchEdgeOrigin => write!(f, "switch_edge_origin"),
            Self::InvalidateEdgeCache => write!(f, "invalidate_edge_cache"),
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detach_global_cluster" => Ok(Self::DetachGlobalCluster),
            "repoint_proxy_targets" => Ok(Self::RepointProxyTargets),
            "switch_edge_origin" => Ok(Self::SwitchEdgeOrigin),
            "invalidate_edge_cache" => Ok(Self::InvalidateEdgeCache),
            _ => Err(format!("Invalid step kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// The desired end state already held, no mutation was issued
    Skipped,
}

impl StepOutcome {
    /// Whether later steps may run after this outcome
    pub fn allows_progress(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_kind: StepKind,
    /// Attempts made for this step, including the one that settled it
    pub attempt: u32,
    pub outcome: StepOutcome,
    pub detail: String,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn new(step_kind: StepKind, attempt: u32, outcome: StepOutcome, detail: impl Into<String>) -> Self {
        Self {
            step_kind,
            attempt,
            outcome,
            detail: detail.into(),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_predecessors() {
        assert_eq!(StepKind::DetachGlobalCluster.predecessor(), None);
        assert_eq!(
            StepKind::RepointProxyTargets.predecessor(),
            Some(StepKind::DetachGlobalCluster)
        );
        assert_eq!(
            StepKind::InvalidateEdgeCache.predecessor(),
            Some(StepKind::SwitchEdgeOrigin)
        );
        for (index, kind) in StepKind::ORDER.iter().enumerate() {
            assert_eq!(kind.position(), index);
        }
    }

    #[test]
    fn test_step_kind_string_conversion() {
        assert_eq!(StepKind::SwitchEdgeOrigin.to_string(), "switch_edge_origin");
        assert_eq!(
            "repoint_proxy_targets".parse::<StepKind>().unwrap(),
            StepKind::RepointProxyTargets
        );
        assert!("reboot".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_outcome_progress() {
        assert!(StepOutcome::Succeeded.allows_progress());
        assert!(StepOutcome::Skipped.allows_progress());
        assert!(!StepOutcome::Failed.allows_progress());
    }
}
