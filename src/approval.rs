//! # Approval Gate
//!
//! Human sign-off before any production mutation. The orchestrator wraps every
//! gate with the configured timeout and the run's cancellation token, so
//! implementations only decide.

use crate::error::{FailoverError, FailoverResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: Uuid,
    pub global_cluster_id: String,
    /// Text shown to the approver
    pub context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

impl ApprovalDecision {
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn await_decision(&self, request: &ApprovalRequest) -> FailoverResult<ApprovalDecision>;
}

/// The pipeline's manual approval stage ran before this process started
#[derive(Debug, Default, Clone)]
pub struct PipelineApprovalGate;

#[async_trait]
impl ApprovalGate for PipelineApprovalGate {
    async fn await_decision(&self, request: &ApprovalRequest) -> FailoverResult<ApprovalDecision> {
        info!(
            run_id = %request.run_id,
            global_cluster_id = %request.global_cluster_id,
            context = %request.context,
            "✅ APPROVAL: Granted by pipeline approval stage"
        );
        Ok(ApprovalDecision::Approved)
    }
}

/// Interactive approval on the operator's terminal
#[derive(Debug, Default, Clone)]
pub struct ConsoleApprovalGate;

impl ConsoleApprovalGate {
    fn parse_answer(answer: &str) -> ApprovalDecision {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => ApprovalDecision::Approved,
            _ => ApprovalDecision::Denied,
        }
    }
}

#[async_trait]
impl ApprovalGate for ConsoleApprovalGate {
    async fn await_decision(&self, request: &ApprovalRequest) -> FailoverResult<ApprovalDecision> {
        let prompt = format!("{} [y/N] ", request.context);
        let answer = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            use std::io::Write;
            let mut stderr = std::io::stderr();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| FailoverError::Configuration(format!("approval prompt failed: {e}")))?
        .map_err(|e| FailoverError::Configuration(format!("approval prompt failed: {e}")))?;

        let decision = Self::parse_answer(&answer);
        if decision.is_approved() {
            info!(run_id = %request.run_id, "✅ APPROVAL: Granted at console");
        } else {
            warn!(run_id = %request.run_id, "🚫 APPROVAL: Denied at console");
        }
        Ok(decision)
    }
}

/// Fixed decision, optionally after a delay
#[derive(Debug, Clone)]
pub struct StaticApprovalGate {
    decision: ApprovalDecision,
    delay: Option<Duration>,
}

impl StaticApprovalGate {
    pub fn approve() -> Self {
        Self {
            decision: ApprovalDecision::Approved,
            delay: None,
        }
    }

    pub fn deny() -> Self {
        Self {
            decision: ApprovalDecision::Denied,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ApprovalGate for StaticApprovalGate {
    async fn await_decision(&self, _request: &ApprovalRequest) -> FailoverResult<ApprovalDecision> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.decision)
    }
}
