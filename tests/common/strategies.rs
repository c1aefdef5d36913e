use failover_core::config::RetryConfig;
use failover_core::models::{DetachMode, FailoverPlan};
use proptest::prelude::*;

/// Strategy for generating cloud region identifiers
pub fn region_strategy() -> impl Strategy<Value = String> {
    "[a-z]{2}-[a-z]{4,9}-[1-9]"
}

/// Strategy for generating resource identifiers
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,30}"
}

pub fn detach_mode_strategy() -> impl Strategy<Value = DetachMode> {
    prop_oneof![Just(DetachMode::Managed), Just(DetachMode::Unmanaged)]
}

/// Strategy for structurally valid plans: distinct regions and clusters
pub fn valid_plan_strategy() -> impl Strategy<Value = FailoverPlan> {
    (
        (region_strategy(), region_strategy()),
        identifier_strategy(),
        (identifier_strategy(), identifier_strategy()),
        (identifier_strategy(), identifier_strategy(), identifier_strategy()),
        detach_mode_strategy(),
        (identifier_strategy(), identifier_strategy(), identifier_strategy()),
    )
        .prop_filter("regions and clusters must differ", |((src, dst), _, (sc, tc), ..)| {
            src != dst && sc != tc
        })
        .prop_map(
            |(
                (source_region, destination_region),
                global_cluster_id,
                (source_cluster_id, target_cluster_id),
                (source_proxy_name, target_proxy_name, proxy_target_group_name),
                detach_mode,
                (edge_distribution_id, edge_origin_id, domain),
            )| FailoverPlan {
                source_region,
                destination_region,
                global_cluster_id,
                source_cluster_id,
                target_cluster_id,
                source_proxy_name,
                target_proxy_name,
                proxy_target_group_name,
                detach_mode,
                edge_distribution_id,
                edge_origin_id,
                new_origin_domain_name: format!("{domain}.example.com"),
            },
        )
}

/// Strategy for retry settings that pass configuration validation
pub fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (
        1u32..20,
        0u64..10_000,
        0u64..600_000,
        1.0f64..10.0,
        0.0f64..=1.0,
    )
        .prop_map(|(max_attempts, base_delay_ms, extra_ms, backoff_multiplier, jitter_factor)| {
            RetryConfig {
                max_attempts,
                rejected_max_attempts: max_attempts.min(2),
                base_delay_ms,
                max_delay_ms: base_delay_ms + extra_ms,
                backoff_multiplier,
                jitter_factor,
            }
        })
}
