#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Failover Core
//!
//! Cross-region failover orchestration for a globally-replicated database and
//! the traffic in front of it.
//!
//! ## Overview
//!
//! An approved [`FailoverPlan`](models::FailoverPlan) is executed as a
//! [`FailoverRun`](models::FailoverRun) of four ordered steps:
//!
//! 1. detach the source cluster from the global cluster
//! 2. repoint the destination connection proxy at the promoted cluster
//! 3. switch the edge distribution's origin to the destination region
//! 4. invalidate the edge cache
//!
//! Each step checks current state before mutating, so re-running a plan whose
//! effects already hold records the step as skipped. Every status change and
//! step result is persisted to a run ledger before the next action.
//!
//! ## Module Organization
//!
//! - [`models`] - plans, runs and step results
//! - [`state_machine`] - run lifecycle transitions and guards
//! - [`orchestration`] - the orchestrator, retry policy and failover locks
//! - [`adapters`] - control-plane capability traits, in-memory and HTTP implementations
//! - [`approval`] - approval gates
//! - [`ledger`] - run persistence (memory, files, PostgreSQL)
//! - [`config`] - layered configuration
//! - [`error`] - structured error handling
//! - [`logging`] - structured logging setup and audit helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use failover_core::adapters::ControlPlane;
//! use failover_core::approval::PipelineApprovalGate;
//! use failover_core::config::FailoverConfig;
//! use failover_core::ledger::InMemoryRunLedger;
//! use failover_core::models::FailoverPlan;
//! use failover_core::orchestration::{FailoverOrchestrator, InProcessFailoverLock};
//! use failover_core::test_utils::pre_failover_control_plane;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let plan = FailoverPlan::from_env()?;
//! let control_plane = pre_failover_control_plane(&plan);
//!
//! let orchestrator = FailoverOrchestrator::new(
//!     ControlPlane::uniform(Arc::new(control_plane)),
//!     Arc::new(InMemoryRunLedger::new()),
//!     Arc::new(InProcessFailoverLock::new()),
//!     Arc::new(PipelineApprovalGate),
//!     &FailoverConfig::default(),
//! );
//!
//! let run = orchestrator.execute(plan).await?;
//! println!("run {} finished {}", run.id, run.status);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod approval;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod test_utils;

pub use error::{AdapterError, FailoverError, FailoverResult};
pub use models::{DetachMode, FailoverPlan, FailoverRun, StepKind, StepOutcome, StepResult};
pub use orchestration::FailoverOrchestrator;
pub use state_machine::RunStatus;
