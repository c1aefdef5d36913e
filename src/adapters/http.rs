//! # HTTP Control-Plane Client
//!
//! REST client for a regional control-plane gateway. Database topology and
//! proxy calls go to the destination region's gateway; edge calls go to the
//! global edge endpoint. Both speak the same JSON conventions:
//!
//! ```text
//! GET  /v1/global-clusters/{gc}/members/{cluster}        -> {"attached": bool}
//! POST /v1/global-clusters/{gc}/detach                   <- {"cluster_id", "mode"}
//! GET  /v1/proxies/{proxy}/target-groups/{tg}/targets    -> {"cluster_ids": [..]}
//! PUT  /v1/proxies/{proxy}/target-groups/{tg}/targets    <- {"cluster_id"}
//! GET  /v1/distributions/{id}/origins/{origin}           -> {"domain_name"}
//! PUT  /v1/distributions/{id}/origins/{origin}           <- {"domain_name"}
//! POST /v1/distributions/{id}/invalidations              <- {"paths": [..]}
//! GET  /health
//! ```
//!
//! Connection failures, timeouts, `429` and `5xx` map to
//! [`AdapterError::Unavailable`]; any other non-success status maps to
//! [`AdapterError::Rejected`].

use super::{DatabaseTopology, EdgeOrigin, RegionProbe, RoutingProxy};
use crate::config::ControlPlaneConfig;
use crate::error::{AdapterError, AdapterResult, FailoverError, FailoverResult};
use crate::models::DetachMode;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct MembershipResponse {
    attached: bool,
}

#[derive(Debug, Serialize)]
struct DetachRequest<'a> {
    cluster_id: &'a str,
    mode: DetachMode,
}

#[derive(Debug, Deserialize)]
struct TargetsResponse {
    cluster_ids: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
struct RebindRequest<'a> {
    cluster_id: &'a str,
}

#[derive(Debug, Serialize, Deserialize)]
struct OriginDocument {
    domain_name: String,
}

#[derive(Debug, Serialize)]
struct InvalidationRequest<'a> {
    paths: &'a [String],
}

fn build_client(config: &ControlPlaneConfig) -> FailoverResult<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(format!("failover-core/{}", env!("CARGO_PKG_VERSION")));

    if let Some(token) = config.bearer_token.as_deref().filter(|t| !t.is_empty()) {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}").parse().map_err(|e| {
                FailoverError::Configuration(format!("Invalid bearer token: {e}"))
            })?,
        );
        builder = builder.default_headers(headers);
        debug!("Configured bearer token authentication for control plane");
    }

    builder
        .build()
        .map_err(|e| FailoverError::Configuration(format!("Failed to create HTTP client: {e}")))
}

fn transport_error(error: reqwest::Error) -> AdapterError {
    AdapterError::unavailable(format!("request failed: {error}"))
}

/// Turn a non-success response into the matching adapter error
async fn check_status(response: Response) -> AdapterResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(AdapterError::unavailable(message))
    } else {
        Err(AdapterError::rejected(message))
    }
}

/// Control-plane gateway client for one endpoint
#[derive(Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for HttpControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpControlPlane")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpControlPlane {
    /// Client for the gateway of `region`
    pub fn for_region(config: &ControlPlaneConfig, region: &str) -> FailoverResult<Self> {
        Self::new(config, &config.regional_endpoint(region))
    }

    /// Client for the global edge endpoint
    pub fn for_edge(config: &ControlPlaneConfig) -> FailoverResult<Self> {
        Self::new(config, &config.edge_endpoint)
    }

    pub fn new(config: &ControlPlaneConfig, base_url: &str) -> FailoverResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            FailoverError::Configuration(format!("Invalid control plane URL {base_url}: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FailoverError::Configuration(format!(
                "Control plane URL {base_url} cannot carry a path"
            )));
        }

        let client = build_client(config)?;
        info!(base_url = %base_url, timeout_ms = config.timeout_ms, "Created control plane client");

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T>(&self, segments: &[&str]) -> AdapterResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(segments);
        debug!(url = %url, "Control plane GET");
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        check_status(response)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AdapterError::rejected(format!("unexpected response body: {e}")))
    }

    async fn send_json<B>(&self, method: reqwest::Method, segments: &[&str], body: &B) -> AdapterResult<()>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments);
        debug!(url = %url, method = %method, "Control plane mutation");
        let response = self
            .client
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }
}

#[async_trait]
impl DatabaseTopology for HttpControlPlane {
    async fn is_attached(&self, global_cluster_id: &str, cluster_id: &str) -> AdapterResult<bool> {
        let membership: MembershipResponse = self
            .get_json(&["v1", "global-clusters", global_cluster_id, "members", cluster_id])
            .await?;
        Ok(membership.attached)
    }

    async fn detach(
        &self,
        global_cluster_id: &str,
        cluster_id: &str,
        mode: DetachMode,
    ) -> AdapterResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &["v1", "global-clusters", global_cluster_id, "detach"],
            &DetachRequest { cluster_id, mode },
        )
        .await
    }
}

#[async_trait]
impl RoutingProxy for HttpControlPlane {
    async fn current_targets(
        &self,
        proxy_name: &str,
        target_group: &str,
    ) -> AdapterResult<BTreeSet<String>> {
        let targets: TargetsResponse = self
            .get_json(&["v1", "proxies", proxy_name, "target-groups", target_group, "targets"])
            .await?;
        Ok(targets.cluster_ids)
    }

    async fn rebind(
        &self,
        proxy_name: &str,
        target_group: &str,
        new_cluster_id: &str,
    ) -> AdapterResult<()> {
        self.send_json(
            reqwest::Method::PUT,
            &["v1", "proxies", proxy_name, "target-groups", target_group, "targets"],
            &RebindRequest {
                cluster_id: new_cluster_id,
            },
        )
        .await
    }
}

#[async_trait]
impl EdgeOrigin for HttpControlPlane {
    async fn current_origin_domain(
        &self,
        distribution_id: &str,
        origin_id: &str,
    ) -> AdapterResult<String> {
        let origin: OriginDocument = self
            .get_json(&["v1", "distributions", distribution_id, "origins", origin_id])
            .await?;
        Ok(origin.domain_name)
    }

    async fn update_origin(
        &self,
        distribution_id: &str,
        origin_id: &str,
        domain: &str,
    ) -> AdapterResult<()> {
        self.send_json(
            reqwest::Method::PUT,
            &["v1", "distributions", distribution_id, "origins", origin_id],
            &OriginDocument {
                domain_name: domain.to_string(),
            },
        )
        .await
    }

    async fn invalidate(&self, distribution_id: &str, paths: &[String]) -> AdapterResult<()> {
        self.send_json(
            reqwest::Method::POST,
            &["v1", "distributions", distribution_id, "invalidations"],
            &InvalidationRequest { paths },
        )
        .await
    }
}

/// Probes each region's gateway health endpoint
#[derive(Clone)]
pub struct HttpRegionProbe {
    client: Client,
    config: ControlPlaneConfig,
}

impl std::fmt::Debug for HttpRegionProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRegionProbe")
            .field("endpoint_template", &self.config.endpoint_template)
            .finish()
    }
}

impl HttpRegionProbe {
    pub fn new(config: &ControlPlaneConfig) -> FailoverResult<Self> {
        let probe = Self {
            client: build_client(config)?,
            config: config.clone(),
        };
        // Surface a broken template now rather than at the first probe
        probe.health_url("region")?;
        Ok(probe)
    }

    fn health_url(&self, region: &str) -> FailoverResult<Url> {
        let endpoint = self.config.regional_endpoint(region);
        let mut url = Url::parse(&endpoint).map_err(|e| {
            FailoverError::Configuration(format!("Invalid regional endpoint {endpoint}: {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                FailoverError::Configuration(format!(
                    "Regional endpoint {endpoint} cannot carry a path"
                ))
            })?
            .pop_if_empty()
            .push("health");
        Ok(url)
    }
}

/// Any HTTP answer below 500 proves the control plane is up, even a refusal
fn proves_reachable(status: StatusCode) -> bool {
    !status.is_server_error()
}

#[async_trait]
impl RegionProbe for HttpRegionProbe {
    async fn is_reachable(&self, region: &str) -> FailoverResult<bool> {
        let url = self.health_url(region)?;

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                debug!(region = %region, status = %status, "Region probe answered");
                Ok(proves_reachable(status))
            }
            Err(e) => {
                debug!(region = %region, error = %e, "Region probe failed");
                Ok(false)
            }
        }
    }
}
