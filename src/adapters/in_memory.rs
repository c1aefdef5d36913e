//! In-memory control plane
//!
//! Models global cluster membership, proxy target groups and edge origins in
//! process. Every call is recorded in order, and faults can be queued per
//! operation to exercise the orchestrator's retry and failure handling.

use super::{DatabaseTopology, EdgeOrigin, RegionProbe, RoutingProxy};
use crate::error::{AdapterError, AdapterResult, FailoverResult};
use crate::models::DetachMode;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Adapter operations, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    IsAttached,
    Detach,
    CurrentTargets,
    Rebind,
    CurrentOriginDomain,
    UpdateOrigin,
    Invalidate,
}

/// A recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneCall {
    IsAttached {
        global_cluster_id: String,
        cluster_id: String,
    },
    Detach {
        global_cluster_id: String,
        cluster_id: String,
        mode: DetachMode,
    },
    CurrentTargets {
        proxy_name: String,
        target_group: String,
    },
    Rebind {
        proxy_name: String,
        target_group: String,
        cluster_id: String,
    },
    CurrentOriginDomain {
        distribution_id: String,
        origin_id: String,
    },
    UpdateOrigin {
        distribution_id: String,
        origin_id: String,
        domain: String,
    },
    Invalidate {
        distribution_id: String,
        paths: Vec<String>,
    },
}

impl ControlPlaneCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::IsAttached { .. } => Operation::IsAttached,
            Self::Detach { .. } => Operation::Detach,
            Self::CurrentTargets { .. } => Operation::CurrentTargets,
            Self::Rebind { .. } => Operation::Rebind,
            Self::CurrentOriginDomain { .. } => Operation::CurrentOriginDomain,
            Self::UpdateOrigin { .. } => Operation::UpdateOrigin,
            Self::Invalidate { .. } => Operation::Invalidate,
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self.operation(),
            Operation::Detach | Operation::Rebind | Operation::UpdateOrigin | Operation::Invalidate
        )
    }
}

#[derive(Debug, Clone)]
enum Fault {
    Unavailable { remaining: u32 },
    Rejected { remaining: Option<u32> },
}

#[derive(Debug, Default)]
struct ControlPlaneState {
    global_clusters: HashMap<String, BTreeSet<String>>,
    proxy_targets: HashMap<(String, String), BTreeSet<String>>,
    origins: HashMap<(String, String), String>,
    invalidations: Vec<(String, Vec<String>)>,
    unreachable_regions: HashSet<String>,
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: Vec<ControlPlaneCall>,
}

impl ControlPlaneState {
    /// Record the call and return the injected fault for it, if any
    fn admit(&mut self, call: ControlPlaneCall) -> AdapterResult<()> {
        let operation = call.operation();
        self.calls.push(call);

        let Some(queue) = self.faults.get_mut(&operation) else {
            return Ok(());
        };
        let Some(fault) = queue.front_mut() else {
            return Ok(());
        };

        let (error, exhausted) = match fault {
            Fault::Unavailable { remaining } => {
                *remaining = remaining.saturating_sub(1);
                (
                    AdapterError::unavailable(format!("{operation:?}: service unavailable")),
                    *remaining == 0,
                )
            }
            Fault::Rejected { remaining } => {
                let exhausted = match remaining {
                    Some(count) => {
                        *count = count.saturating_sub(1);
                        *count == 0
                    }
                    None => false,
                };
                (
                    AdapterError::rejected(format!("{operation:?}: precondition not met")),
                    exhausted,
                )
            }
        };

        if exhausted {
            queue.pop_front();
        }
        Err(error)
    }
}

/// Shared-state in-memory control plane; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<ControlPlaneState>>,
    latency: Option<Duration>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to hold a run in flight
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn seed_global_cluster<'a>(
        &self,
        global_cluster_id: &str,
        members: impl IntoIterator<Item = &'a str>,
    ) {
        self.state.lock().global_clusters.insert(
            global_cluster_id.to_string(),
            members.into_iter().map(str::to_string).collect(),
        );
    }

    pub fn seed_proxy_targets<'a>(
        &self,
        proxy_name: &str,
        target_group: &str,
        cluster_ids: impl IntoIterator<Item = &'a str>,
    ) {
        self.state.lock().proxy_targets.insert(
            (proxy_name.to_string(), target_group.to_string()),
            cluster_ids.into_iter().map(str::to_string).collect(),
        );
    }

    pub fn seed_origin(&self, distribution_id: &str, origin_id: &str, domain: &str) {
        self.state.lock().origins.insert(
            (distribution_id.to_string(), origin_id.to_string()),
            domain.to_string(),
        );
    }

    pub fn mark_unreachable(&self, region: &str) {
        self.state
            .lock()
            .unreachable_regions
            .insert(region.to_string());
    }

    /// Fail the next `times` calls of `operation` as unavailable
    pub fn fail_unavailable(&self, operation: Operation, times: u32) {
        if times == 0 {
            return;
        }
        self.push_fault(operation, Fault::Unavailable { remaining: times });
    }

    /// Reject the next `times` calls of `operation`
    pub fn reject(&self, operation: Operation, times: u32) {
        if times == 0 {
            return;
        }
        self.push_fault(
            operation,
            Fault::Rejected {
                remaining: Some(times),
            },
        );
    }

    /// Reject every future call of `operation`
    pub fn reject_always(&self, operation: Operation) {
        self.push_fault(operation, Fault::Rejected { remaining: None });
    }

    /// Drop all queued faults
    pub fn heal(&self) {
        self.state.lock().faults.clear();
    }

    pub fn calls(&self) -> Vec<ControlPlaneCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<ControlPlaneCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn global_cluster_members(&self, global_cluster_id: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .global_clusters
            .get(global_cluster_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn proxy_targets(&self, proxy_name: &str, target_group: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .proxy_targets
            .get(&(proxy_name.to_string(), target_group.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn origin_domain(&self, distribution_id: &str, origin_id: &str) -> Option<String> {
        self.state
            .lock()
            .origins
            .get(&(distribution_id.to_string(), origin_id.to_string()))
            .cloned()
    }

    pub fn invalidations(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().invalidations.clone()
    }

    fn push_fault(&self, operation: Operation, fault: Fault) {
        self.state
            .lock()
            .faults
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl DatabaseTopology for InMemoryControlPlane {
    async fn is_attached(&self, global_cluster_id: &str, cluster_id: &str) -> AdapterResult<bool> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::IsAttached {
            global_cluster_id: global_cluster_id.to_string(),
            cluster_id: cluster_id.to_string(),
        })?;

        Ok(state
            .global_clusters
            .get(global_cluster_id)
            .is_some_and(|members| members.contains(cluster_id)))
    }

    async fn detach(
        &self,
        global_cluster_id: &str,
        cluster_id: &str,
        mode: DetachMode,
    ) -> AdapterResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::Detach {
            global_cluster_id: global_cluster_id.to_string(),
            cluster_id: cluster_id.to_string(),
            mode,
        })?;

        let members = state
            .global_clusters
            .get_mut(global_cluster_id)
            .ok_or_else(|| {
                AdapterError::rejected(format!("global cluster {global_cluster_id} not found"))
            })?;
        members.remove(cluster_id);
        Ok(())
    }
}

#[async_trait]
impl RoutingProxy for InMemoryControlPlane {
    async fn current_targets(
        &self,
        proxy_name: &str,
        target_group: &str,
    ) -> AdapterResult<BTreeSet<String>> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::CurrentTargets {
            proxy_name: proxy_name.to_string(),
            target_group: target_group.to_string(),
        })?;

        Ok(state
            .proxy_targets
            .get(&(proxy_name.to_string(), target_group.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn rebind(
        &self,
        proxy_name: &str,
        target_group: &str,
        new_cluster_id: &str,
    ) -> AdapterResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::Rebind {
            proxy_name: proxy_name.to_string(),
            target_group: target_group.to_string(),
            cluster_id: new_cluster_id.to_string(),
        })?;

        state.proxy_targets.insert(
            (proxy_name.to_string(), target_group.to_string()),
            BTreeSet::from([new_cluster_id.to_string()]),
        );
        Ok(())
    }
}

#[async_trait]
impl EdgeOrigin for InMemoryControlPlane {
    async fn current_origin_domain(
        &self,
        distribution_id: &str,
        origin_id: &str,
    ) -> AdapterResult<String> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::CurrentOriginDomain {
            distribution_id: distribution_id.to_string(),
            origin_id: origin_id.to_string(),
        })?;

        state
            .origins
            .get(&(distribution_id.to_string(), origin_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdapterError::rejected(format!(
                    "origin {origin_id} not found on distribution {distribution_id}"
                ))
            })
    }

    async fn update_origin(
        &self,
        distribution_id: &str,
        origin_id: &str,
        domain: &str,
    ) -> AdapterResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::UpdateOrigin {
            distribution_id: distribution_id.to_string(),
            origin_id: origin_id.to_string(),
            domain: domain.to_string(),
        })?;

        let origin = state
            .origins
            .get_mut(&(distribution_id.to_string(), origin_id.to_string()))
            .ok_or_else(|| {
                AdapterError::rejected(format!(
                    "origin {origin_id} not found on distribution {distribution_id}"
                ))
            })?;
        *origin = domain.to_string();
        Ok(())
    }

    async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> AdapterResult<()> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        state.admit(ControlPlaneCall::Invalidate {
            distribution_id: distribution_id.to_string(),
            paths: paths.to_vec(),
        })?;

        state
            .invalidations
            .push((distribution_id.to_string(), paths.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl RegionProbe for InMemoryControlPlane {
    async fn is_reachable(&self, region: &str) -> FailoverResult<bool> {
        Ok(!self.state.lock().unreachable_regions.contains(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let control_plane = InMemoryControlPlane::new();
        control_plane.seed_global_cluster("gc-1", ["c-src", "c-dst"]);

        control_plane
            .detach("gc-1", "c-src", DetachMode::Managed)
            .await
            .unwrap();
        control_plane
            .detach("gc-1", "c-src", DetachMode::Managed)
            .await
            .unwrap();

        assert!(!control_plane.is_attached("gc-1", "c-src").await.unwrap());
        assert_eq!(
            control_plane.global_cluster_members("gc-1"),
            BTreeSet::from(["c-dst".to_string()])
        );
    }

    #[tokio::test]
    async fn test_unavailable_fault_is_consumed() {
        let control_plane = InMemoryControlPlane::new();
        control_plane.seed_proxy_targets("proxy", "default", ["c-src"]);
        control_plane.fail_unavailable(Operation::Rebind, 2);

        for _ in 0..2 {
            let err = control_plane
                .rebind("proxy", "default", "c-dst")
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        control_plane.rebind("proxy", "default", "c-dst").await.unwrap();

        assert_eq!(
            control_plane.proxy_targets("proxy", "default"),
            BTreeSet::from(["c-dst".to_string()])
        );
        assert_eq!(control_plane.mutation_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_rejection() {
        let control_plane = InMemoryControlPlane::new();
        control_plane.seed_origin("dist", "origin1", "old.example.com");
        control_plane.reject_always(Operation::UpdateOrigin);

        for _ in 0..3 {
            let err = control_plane
                .update_origin("dist", "origin1", "new.example.com")
                .await
                .unwrap_err();
            assert!(matches!(err, AdapterError::Rejected(_)));
        }
        assert_eq!(
            control_plane.origin_domain("dist", "origin1").as_deref(),
            Some("old.example.com")
        );
    }

    #[tokio::test]
    async fn test_unknown_origin_rejected() {
        let control_plane = InMemoryControlPlane::new();
        let err = control_plane
            .current_origin_domain("dist", "origin1")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_region_reachability() {
        let control_plane = InMemoryControlPlane::new();
        assert!(control_plane.is_reachable("us-east-1").await.unwrap());
        control_plane.mark_unreachable("us-east-1");
        assert!(!control_plane.is_reachable("us-east-1").await.unwrap());
    }
}
