//! # Orchestration Engine
//!
//! Executes failover runs: approval, per-global-cluster locking, ordered step
//! execution with state checks and bounded retry.
//!
//! ## Core Components
//!
//! - **FailoverOrchestrator**: `execute` and `resume`, the only entry points
//!   that mutate production resources
//! - **RetryPolicy**: exponential backoff with jitter, budgets per error kind
//! - **FailoverLock**: at most one running run per global cluster, in process,
//!   across processes via lock files, or across hosts via PostgreSQL

pub mod lock;
pub mod orchestrator;
pub mod retry;

pub use lock::{FailoverLock, FileFailoverLock, InProcessFailoverLock, PgFailoverLock};
pub use orchestrator::FailoverOrchestrator;
pub use retry::RetryPolicy;
