//! # Failover Configuration System
//!
//! Operational settings for the orchestrator: retry policy, approval timeout,
//! ledger backend, control-plane endpoints and cache invalidation paths.
//! The failover *plan* is not configuration; it arrives separately as a
//! validated [`crate::models::FailoverPlan`].
//!
//! ## Sources (later wins)
//!
//! 1. built-in defaults
//! 2. `<config_dir>/failover.toml` (optional)
//! 3. `<config_dir>/failover.<environment>.toml` (optional)
//! 4. environment variables `FAILOVER__<SECTION>__<KEY>`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use failover_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_attempts = manager.config().retry.max_attempts;
//! let timeout = manager.config().approval.timeout();
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants::defaults;
use crate::error::{FailoverError, FailoverResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use loader::ConfigManager;

/// Root configuration structure mirroring failover.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Per-step retry and backoff policy
    pub retry: RetryConfig,

    /// Approval gate behaviour
    pub approval: ApprovalConfig,

    /// Where runs are persisted
    pub ledger: LedgerConfig,

    /// Control-plane gateway endpoints
    pub control_plane: ControlPlaneConfig,

    /// Edge cache settings
    pub edge: EdgeConfig,
}

impl FailoverConfig {
    /// Reject settings that would make the orchestrator misbehave
    pub fn validate(&self) -> FailoverResult<()> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(FailoverError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if retry.rejected_max_attempts == 0 || retry.rejected_max_attempts > retry.max_attempts {
            return Err(FailoverError::Configuration(format!(
                "retry.rejected_max_attempts must be between 1 and retry.max_attempts ({})",
                retry.max_attempts
            )));
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            return Err(FailoverError::Configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.base_delay_ms, retry.max_delay_ms
            )));
        }
        if !(retry.backoff_multiplier >= 1.0 && retry.backoff_multiplier.is_finite()) {
            return Err(FailoverError::Configuration(
                "retry.backoff_multiplier must be a finite value >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(FailoverError::Configuration(
                "retry.jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.ledger.backend == LedgerBackend::Postgres
            && self
                .ledger
                .database_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(FailoverError::Configuration(
                "ledger.database_url is required for the postgres backend".to_string(),
            ));
        }

        if self.edge.invalidation_paths.is_empty()
            || self
                .edge
                .invalidation_paths
                .iter()
                .any(|path| !path.starts_with('/'))
        {
            return Err(FailoverError::Configuration(
                "edge.invalidation_paths must be non-empty absolute paths".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per step for transient (unavailable) failures
    pub max_attempts: u32,
    /// Attempts per step once the service has rejected the operation
    pub rejected_max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Extra random delay as a fraction of the computed delay (0.0 disables)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            rejected_max_attempts: defaults::REJECTED_MAX_ATTEMPTS,
            base_delay_ms: defaults::BASE_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
            backoff_multiplier: defaults::BACKOFF_MULTIPLIER,
            jitter_factor: defaults::JITTER_FACTOR,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Policy with no waiting between attempts
    pub fn immediate(max_attempts: u32, rejected_max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rejected_max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds to wait for a decision; unset waits indefinitely
    pub timeout_seconds: Option<u64>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    File,
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    /// Directory for the file backend (runs and lock files)
    pub directory: PathBuf,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::File,
            directory: PathBuf::from(defaults::LEDGER_DIRECTORY),
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Regional gateway URL; `{region}` is replaced with the region identifier
    pub endpoint_template: String,
    /// Global edge gateway URL
    pub edge_endpoint: String,
    pub timeout_ms: u64,
    pub bearer_token: Option<String>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint_template: "https://control-plane.{region}.internal".to_string(),
            edge_endpoint: "https://edge-control.internal".to_string(),
            timeout_ms: defaults::CONTROL_PLANE_TIMEOUT_MS,
            bearer_token: None,
        }
    }
}

impl ControlPlaneConfig {
    pub fn regional_endpoint(&self, region: &str) -> String {
        self.endpoint_template.replace("{region}", region)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub invalidation_paths: Vec<String>,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            invalidation_paths: vec![defaults::INVALIDATION_PATH.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = FailoverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(2));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(60));
        assert_eq!(config.approval.timeout(), None);
        assert_eq!(config.edge.invalidation_paths, vec!["/*".to_string()]);
    }

    #[test]
    fn test_invalid_retry_rejected() {
        let mut config = FailoverConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = FailoverConfig::default();
        config.retry.base_delay_ms = 120_000;
        assert!(config.validate().is_err());

        let mut config = FailoverConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = FailoverConfig::default();
        config.ledger.backend = LedgerBackend::Postgres;
        assert!(config.validate().is_err());

        config.ledger.database_url = Some("postgresql://localhost/failover".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_regional_endpoint() {
        let config = ControlPlaneConfig::default();
        assert_eq!(
            config.regional_endpoint("us-west-2"),
            "https://control-plane.us-west-2.internal"
        );
    }
}
