//! # Data Model
//!
//! - [`FailoverPlan`]: immutable input of one failover attempt
//! - [`FailoverRun`]: the persisted execution of a plan
//! - [`StepResult`]: one settled step in a run's ledger

pub mod plan;
pub mod run;
pub mod step;

pub use plan::{DetachMode, FailoverPlan};
pub use run::FailoverRun;
pub use step::{StepKind, StepOutcome, StepResult};
