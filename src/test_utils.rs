//! # Test Utilities
//!
//! Fixtures shared by unit tests, integration tests and the simulator: the
//! reference plan (us-east-1 to us-west-2) and an in-memory control plane seeded
//! so that plan starts from the pre-failover topology.

use crate::adapters::InMemoryControlPlane;
use crate::models::{DetachMode, FailoverPlan, FailoverRun};

/// The reference failover plan: gc-1, c-src in us-east-1 to c-dst in us-west-2
pub fn sample_plan() -> FailoverPlan {
    FailoverPlan {
        source_region: "us-east-1".to_string(),
        destination_region: "us-west-2".to_string(),
        global_cluster_id: "gc-1".to_string(),
        source_cluster_id: "c-src".to_string(),
        target_cluster_id: "c-dst".to_string(),
        source_proxy_name: "proxy-src".to_string(),
        target_proxy_name: "proxy-dst".to_string(),
        proxy_target_group_name: "default".to_string(),
        detach_mode: DetachMode::Managed,
        edge_distribution_id: "dist-1".to_string(),
        edge_origin_id: "origin1".to_string(),
        new_origin_domain_name: "dst.example.com".to_string(),
    }
}

/// A fresh run of [`sample_plan`], awaiting approval
pub fn sample_run() -> FailoverRun {
    FailoverRun::new(sample_plan())
}

/// Control plane in the state the plan expects before failover:
/// the source cluster attached, the destination proxy bound to the old
/// source-side cluster, and the edge origin still on the source domain
pub fn pre_failover_control_plane(plan: &FailoverPlan) -> InMemoryControlPlane {
    let control_plane = InMemoryControlPlane::new();
    control_plane.seed_global_cluster(
        &plan.global_cluster_id,
        [plan.source_cluster_id.as_str(), plan.target_cluster_id.as_str()],
    );
    control_plane.seed_proxy_targets(
        &plan.target_proxy_name,
        &plan.proxy_target_group_name,
        [plan.source_cluster_id.as_str()],
    );
    control_plane.seed_origin(
        &plan.edge_distribution_id,
        &plan.edge_origin_id,
        &format!("{}.example.com", plan.source_region),
    );
    control_plane
}
