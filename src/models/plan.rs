//! # Failover Plan
//!
//! The immutable description of one failover attempt. A plan is built once from
//! named parameters (the pipeline binds them as environment variables), validated,
//! and then handed to the orchestrator by value.

use crate::constants::{defaults, parameters, PLAN_KEY_NAMESPACE};
use crate::error::{FailoverError, FailoverResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How the source cluster leaves the global cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachMode {
    /// Graceful promotion coordinated with the source region
    Managed,
    /// Forced break used when the source region is unreachable; not reversible
    Unmanaged,
}

impl DetachMode {
    pub fn is_destructive(&self) -> bool {
        matches!(self, Self::Unmanaged)
    }
}

impl Default for DetachMode {
    fn default() -> Self {
        Self::Managed
    }
}

impl fmt::Display for DetachMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Managed => write!(f, "managed"),
            Self::Unmanaged => write!(f, "unmanaged"),
        }
    }
}

impl std::str::FromStr for DetachMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" => Ok(Self::Managed),
            "unmanaged" => Ok(Self::Unmanaged),
            other => Err(format!("Invalid detach mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverPlan {
    pub source_region: String,
    pub destination_region: String,
    pub global_cluster_id: String,
    pub source_cluster_id: String,
    pub target_cluster_id: String,
    pub source_proxy_name: String,
    pub target_proxy_name: String,
    pub proxy_target_group_name: String,
    pub detach_mode: DetachMode,
    pub edge_distribution_id: String,
    pub edge_origin_id: String,
    pub new_origin_domain_name: String,
}

impl FailoverPlan {
    /// Build a plan from the pipeline's environment
    pub fn from_env() -> FailoverResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a plan from any name-to-value source and validate it
    ///
    /// Missing required values are reported together rather than one at a time.
    pub fn from_lookup<F>(lookup: F) -> FailoverResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |name: &str| -> String {
            match lookup(name).map(|v| v.trim().to_string()) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let source_region = required(parameters::SOURCE_REGION);
        let destination_region = required(parameters::DESTINATION_REGION);
        let global_cluster_id = required(parameters::GLOBAL_CLUSTER_NAME);
        let target_cluster_id = required(parameters::TARGET_CLUSTER_ID);
        let target_proxy_name = required(parameters::TARGET_PROXY_NAME);
        let source_cluster_id = required(parameters::SOURCE_CLUSTER_ID);
        let source_proxy_name = required(parameters::SOURCE_PROXY_NAME);
        let edge_distribution_id = required(parameters::EDGE_DISTRIBUTION_ID);
        let new_origin_domain_name = required(parameters::NEW_ORIGIN_DOMAIN_NAME);

        if !missing.is_empty() {
            return Err(FailoverError::InvalidPlan(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }

        let optional = |name: &str, default: &str| -> String {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let detach_mode = optional(parameters::DETACH_MODE, defaults::DETACH_MODE)
            .parse::<DetachMode>()
            .map_err(FailoverError::InvalidPlan)?;

        let plan = Self {
            source_region,
            destination_region,
            global_cluster_id,
            source_cluster_id,
            target_cluster_id,
            source_proxy_name,
            target_proxy_name,
            proxy_target_group_name: optional(
                parameters::PROXY_TARGET_GROUP_NAME,
                defaults::PROXY_TARGET_GROUP_NAME,
            ),
            detach_mode,
            edge_distribution_id,
            edge_origin_id: optional(parameters::EDGE_ORIGIN_ID, defaults::EDGE_ORIGIN_ID),
            new_origin_domain_name,
        };

        plan.validate()?;
        Ok(plan)
    }

    /// Check the structural invariants of the plan
    ///
    /// Reachability of the source region (required for an unmanaged detach) needs a
    /// live probe and is checked by the orchestrator, not here.
    pub fn validate(&self) -> FailoverResult<()> {
        let mut violations: Vec<String> = self
            .identifiers()
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| format!("{name} must not be empty"))
            .collect();

        if !self.source_region.trim().is_empty() && self.source_region == self.destination_region {
            violations.push(format!(
                "source_region and destination_region must differ (both {})",
                self.source_region
            ));
        }

        if !self.source_cluster_id.trim().is_empty()
            && self.source_cluster_id == self.target_cluster_id
        {
            violations.push(format!(
                "source_cluster_id and target_cluster_id must differ (both {})",
                self.source_cluster_id
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(FailoverError::InvalidPlan(violations.join("; ")))
        }
    }

    /// Deterministic idempotency key shared by identical plans
    pub fn plan_key(&self) -> Uuid {
        let canonical = self
            .identifiers()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .chain(std::iter::once(format!("detach_mode={}", self.detach_mode)))
            .collect::<Vec<_>>()
            .join("\n");
        Uuid::new_v5(&PLAN_KEY_NAMESPACE, canonical.as_bytes())
    }

    /// Context shown to whoever authorizes the run
    pub fn approval_context(&self) -> String {
        let mut context = format!(
            "Approve failover of {} from {} to {}?",
            self.global_cluster_id, self.source_region, self.destination_region
        );
        if self.detach_mode.is_destructive() {
            context.push_str(" (UNMANAGED detach: forced and not reversible)");
        }
        context
    }

    fn identifiers(&self) -> [(&'static str, &str); 11] {
        [
            ("source_region", self.source_region.as_str()),
            ("destination_region", self.destination_region.as_str()),
            ("global_cluster_id", self.global_cluster_id.as_str()),
            ("source_cluster_id", self.source_cluster_id.as_str()),
            ("target_cluster_id", self.target_cluster_id.as_str()),
            ("source_proxy_name", self.source_proxy_name.as_str()),
            ("target_proxy_name", self.target_proxy_name.as_str()),
            ("proxy_target_group_name", self.proxy_target_group_name.as_str()),
            ("edge_distribution_id", self.edge_distribution_id.as_str()),
            ("edge_origin_id", self.edge_origin_id.as_str()),
            ("new_origin_domain_name", self.new_origin_domain_name.as_str()),
        ]
    }
}
