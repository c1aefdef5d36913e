//! Bounded retry with exponential backoff for adapter calls.

use crate::config::RetryConfig;
use crate::error::AdapterError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Total attempts a step may make once it has seen `error`
    pub fn attempt_budget(&self, error: &AdapterError) -> u32 {
        match error {
            AdapterError::Unavailable(_) => self.config.max_attempts,
            AdapterError::Rejected(_) => self
                .config
                .rejected_max_attempts
                .min(self.config.max_attempts),
        }
    }

    /// Whether another attempt is allowed after `attempts_made` attempts ended in `error`
    pub fn should_retry(&self, attempts_made: u32, error: &AdapterError) -> bool {
        attempts_made < self.attempt_budget(error)
    }

    /// Delay before the attempt following attempt number `attempt_number`
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let max_ms = self.config.max_delay_ms as f64;
        let exponent = attempt_number.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.config.base_delay_ms as f64
            * self.config.backoff_multiplier.powi(exponent))
        .min(max_ms);

        let jittered_ms = if self.config.jitter_factor > 0.0 {
            let jitter = fastrand::f64() * self.config.jitter_factor;
            delay_ms * (1.0 + jitter)
        } else {
            delay_ms
        };

        let clamped = if jittered_ms.is_finite() {
            jittered_ms.clamp(0.0, max_ms)
        } else {
            max_ms
        };
        Duration::from_millis(clamped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
