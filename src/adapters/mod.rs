//! # Control-Plane Adapters
//!
//! Narrow capability traits for the three services a failover mutates, plus a
//! reachability probe used to validate forced (unmanaged) detaches.
//!
//! Every mutating call must be safe to repeat with the same arguments. The
//! orchestrator additionally checks current state before each mutation, so an
//! adapter never sees a mutation whose end state already holds.
//!
//! ## Implementations
//!
//! - [`InMemoryControlPlane`]: full in-memory model with call recording and fault
//!   injection, used by tests and the CLI's simulate mode
//! - [`HttpControlPlane`]: REST client for a regional control-plane gateway

pub mod http;
pub mod in_memory;

use crate::error::{AdapterResult, FailoverResult};
use crate::models::DetachMode;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

pub use http::{HttpControlPlane, HttpRegionProbe};
pub use in_memory::{ControlPlaneCall, InMemoryControlPlane, Operation};

/// Membership of regional clusters in a globally-replicated cluster
#[async_trait]
pub trait DatabaseTopology: Send + Sync {
    async fn is_attached(&self, global_cluster_id: &str, cluster_id: &str) -> AdapterResult<bool>;

    async fn detach(
        &self,
        global_cluster_id: &str,
        cluster_id: &str,
        mode: DetachMode,
    ) -> AdapterResult<()>;
}

/// Backend binding of a connection-pooling proxy's target group
#[async_trait]
pub trait RoutingProxy: Send + Sync {
    async fn current_targets(
        &self,
        proxy_name: &str,
        target_group: &str,
    ) -> AdapterResult<BTreeSet<String>>;

    /// Replace whatever the target group points at with `new_cluster_id`
    async fn rebind(
        &self,
        proxy_name: &str,
        target_group: &str,
        new_cluster_id: &str,
    ) -> AdapterResult<()>;
}

/// Origin routing and cache control of an edge distribution
#[async_trait]
pub trait EdgeOrigin: Send + Sync {
    async fn current_origin_domain(
        &self,
        distribution_id: &str,
        origin_id: &str,
    ) -> AdapterResult<String>;

    async fn update_origin(
        &self,
        distribution_id: &str,
        origin_id: &str,
        domain: &str,
    ) -> AdapterResult<()>;

    async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> AdapterResult<()>;
}

/// Whether a region's control plane answers at all
///
/// An error means the probe could not be carried out (misconfiguration), which
/// is never evidence that the region is down.
#[async_trait]
pub trait RegionProbe: Send + Sync {
    async fn is_reachable(&self, region: &str) -> FailoverResult<bool>;
}

/// The set of adapters one orchestrator drives
#[derive(Clone)]
pub struct ControlPlane {
    pub topology: Arc<dyn DatabaseTopology>,
    pub proxy: Arc<dyn RoutingProxy>,
    pub edge: Arc<dyn EdgeOrigin>,
    pub probe: Arc<dyn RegionProbe>,
}

impl ControlPlane {
    pub fn new(
        topology: Arc<dyn DatabaseTopology>,
        proxy: Arc<dyn RoutingProxy>,
        edge: Arc<dyn EdgeOrigin>,
        probe: Arc<dyn RegionProbe>,
    ) -> Self {
        Self {
            topology,
            proxy,
            edge,
            probe,
        }
    }

    /// Use one implementation for every capability
    pub fn uniform<T>(adapter: Arc<T>) -> Self
    where
        T: DatabaseTopology + RoutingProxy + EdgeOrigin + RegionProbe + 'static,
    {
        Self {
            topology: adapter.clone(),
            proxy: adapter.clone(),
            edge: adapter.clone(),
            probe: adapter,
        }
    }
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane").finish_non_exhaustive()
    }
}
