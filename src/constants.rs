//! # System Constants
//!
//! Parameter names, defaults and audit event names that define the operational
//! surface of the failover orchestrator.

/// Audit events emitted while a failover run progresses
pub mod events {
    pub const RUN_SUBMITTED: &str = "run.submitted";
    pub const RUN_APPROVED: &str = "run.approved";
    pub const RUN_DENIED: &str = "run.denied";
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_RESUMED: &str = "run.resumed";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";

    pub const STEP_SKIPPED: &str = "step.skipped";
    pub const STEP_ATTEMPTED: &str = "step.attempted";
    pub const STEP_SUCCEEDED: &str = "step.succeeded";
    pub const STEP_FAILED: &str = "step.failed";
}

/// Environment variables bound by the failover pipeline's build project
pub mod parameters {
    pub const SOURCE_REGION: &str = "AWS_SRC_REGION";
    pub const DESTINATION_REGION: &str = "AWS_DEST_REGION";
    pub const GLOBAL_CLUSTER_NAME: &str = "GLOBAL_CLUSTER_NAME";
    pub const DETACH_MODE: &str = "BREAK_CLUSTER";
    pub const TARGET_CLUSTER_ID: &str = "TARGET_CLUSTER_ID";
    pub const TARGET_PROXY_NAME: &str = "TARGET_RDS_PROXY_NAME";
    pub const PROXY_TARGET_GROUP_NAME: &str = "RDS_PROXY_TARGET_GROUP_NAME";
    pub const SOURCE_CLUSTER_ID: &str = "SRC_CLUSTER_ID";
    pub const SOURCE_PROXY_NAME: &str = "SRC_RDS_PROXY_NAME";
    pub const EDGE_DISTRIBUTION_ID: &str = "CLOUDFRONT_DISTRIBUTION_ID";
    pub const EDGE_ORIGIN_ID: &str = "CLOUDFRONT_ORIGIN_ID";
    pub const NEW_ORIGIN_DOMAIN_NAME: &str = "CLOUDFRONT_NEW_ORIGIN_DOMAIN_NAME";
}

/// Defaults applied when an optional parameter is absent
pub mod defaults {
    pub const PROXY_TARGET_GROUP_NAME: &str = "default";
    pub const EDGE_ORIGIN_ID: &str = "origin1";
    pub const DETACH_MODE: &str = "managed";
    pub const INVALIDATION_PATH: &str = "/*";

    pub const MAX_ATTEMPTS: u32 = 5;
    pub const REJECTED_MAX_ATTEMPTS: u32 = 2;
    pub const BASE_DELAY_MS: u64 = 2_000;
    pub const MAX_DELAY_MS: u64 = 60_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const JITTER_FACTOR: f64 = 0.1;

    pub const LEDGER_DIRECTORY: &str = ".failover/runs";
    pub const CONTROL_PLANE_TIMEOUT_MS: u64 = 30_000;
}

/// Namespace used to derive deterministic plan keys (UUID v5)
pub const PLAN_KEY_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6f2c_9a1e_4b7d_4c3a_9e51_d08b_27f4_a913);

/// Process exit codes reported to the triggering pipeline
pub mod exit_codes {
    pub const COMPLETED: i32 = 0;
    pub const FAILED: i32 = 1;
    pub const ERROR: i32 = 2;
}
