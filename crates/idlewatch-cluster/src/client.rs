//! Directory lookups over the cluster API.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::error::DirectoryError;
use crate::objects::{
    Ingress, MetadataOnly, OwnerRef, Pod, PodList, PodRequests, RouteBackend, Service,
    controlling_owner, find_backend,
};
use crate::quantity;

/// The lookup seam the report layer consumes.
///
/// Implemented by [`DirectoryClient`] against a live API server and by
/// in-memory fixtures under test.
pub trait Directory {
    /// Aggregate reserved CPU (milli) and memory (bytes) across a pod's
    /// containers.
    fn pod_requests(
        &self,
        namespace: &str,
        pod: &str,
    ) -> impl Future<Output = Result<PodRequests, DirectoryError>> + Send;

    /// A service's label selector.
    fn service_selector(
        &self,
        namespace: &str,
        service: &str,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, DirectoryError>> + Send;

    /// The backend service behind an ingress rule for `host` + `path`.
    fn ingress_backend(
        &self,
        namespace: &str,
        ingress: &str,
        host: &str,
        path: &str,
    ) -> impl Future<Output = Result<RouteBackend, DirectoryError>> + Send;

    /// Names of pods matching a label selector.
    fn pods_for_selector(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<String>, DirectoryError>> + Send;

    /// The controller owning a pod, walking one ownership level and one
    /// more when that owner is itself owned (pod → ReplicaSet →
    /// Deployment).
    fn pod_owner(
        &self,
        namespace: &str,
        pod: &str,
    ) -> impl Future<Output = Result<Option<OwnerRef>, DirectoryError>> + Send;
}

/// Directory client bound to one API server.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base: reqwest::Url,
}

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_PAUSE: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl DirectoryClient {
    /// Build a client from `config` and verify the connection by
    /// listing nodes, with a bounded number of attempts.
    pub async fn connect(config: &ClusterConfig) -> Result<Self, DirectoryError> {
        let client = Self::build(config)?;

        let mut last = String::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            match client
                .get_json::<serde_json::Value>("api/v1/nodes", &[("limit", "1")])
                .await
            {
                Ok(_) => {
                    debug!(attempt, "cluster connection verified");
                    return Ok(client);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        of = CONNECT_ATTEMPTS,
                        error = %e,
                        "cluster connection check failed"
                    );
                    last = e.to_string();
                    if attempt < CONNECT_ATTEMPTS {
                        tokio::time::sleep(CONNECT_PAUSE).await;
                    }
                }
            }
        }

        Err(DirectoryError::Unreachable { attempts: CONNECT_ATTEMPTS, last })
    }

    fn build(config: &ClusterConfig) -> Result<Self, DirectoryError> {
        let mut base = reqwest::Url::parse(&config.server).map_err(|e| {
            DirectoryError::Config(format!("invalid API server {:?}: {e}", config.server))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.token {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| DirectoryError::Config(format!("invalid bearer token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers);
        if let Some(pem) = &config.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(Self { http: builder.build()?, base })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let url = self.base.join(path).map_err(|e| {
            DirectoryError::Config(format!("invalid resource path {path:?}: {e}"))
        })?;

        let response = self.http.get(url).query(query).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(path.to_string()));
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

impl Directory for DirectoryClient {
    async fn pod_requests(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<PodRequests, DirectoryError> {
        let object: Pod = self
            .get_json(&format!("api/v1/namespaces/{namespace}/pods/{pod}"), &[])
            .await?;

        let mut total = PodRequests::default();
        for container in &object.spec.containers {
            let requests = &container.resources.requests;
            if let Some(cpu) = requests.get("cpu") {
                total.cpu_milli += quantity::cpu_milli(cpu).unwrap_or(0);
            }
            if let Some(memory) = requests.get("memory") {
                total.memory_bytes += quantity::memory_bytes(memory).unwrap_or(0);
            }
        }
        Ok(total)
    }

    async fn service_selector(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, DirectoryError> {
        let object: Service = self
            .get_json(&format!("api/v1/namespaces/{namespace}/services/{service}"), &[])
            .await?;
        Ok(object.spec.selector)
    }

    async fn ingress_backend(
        &self,
        namespace: &str,
        ingress: &str,
        host: &str,
        path: &str,
    ) -> Result<RouteBackend, DirectoryError> {
        let object: Ingress = self
            .get_json(
                &format!("apis/networking.k8s.io/v1/namespaces/{namespace}/ingresses/{ingress}"),
                &[],
            )
            .await?;

        find_backend(&object, host, path).ok_or_else(|| {
            DirectoryError::NotFound(format!("{namespace}/{ingress}: no backend for {host}{path}"))
        })
    }

    async fn pods_for_selector(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<String>, DirectoryError> {
        if selector.is_empty() {
            return Ok(Vec::new());
        }

        let label_selector = selector
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let list: PodList = self
            .get_json(
                &format!("api/v1/namespaces/{namespace}/pods"),
                &[("labelSelector", label_selector.as_str())],
            )
            .await?;
        Ok(list.items.into_iter().map(|p| p.metadata.name).collect())
    }

    async fn pod_owner(
        &self,
        namespace: &str,
        pod: &str,
    ) -> Result<Option<OwnerRef>, DirectoryError> {
        let object: MetadataOnly = self
            .get_json(&format!("api/v1/namespaces/{namespace}/pods/{pod}"), &[])
            .await?;

        let Some(first) = controlling_owner(&object.metadata) else {
            return Ok(None);
        };

        // One more level when the direct owner is itself owned, so a
        // ReplicaSet resolves to its Deployment.
        if first.kind == "ReplicaSet" {
            let rs: MetadataOnly = self
                .get_json(
                    &format!(
                        "apis/apps/v1/namespaces/{namespace}/replicasets/{}",
                        first.name
                    ),
                    &[],
                )
                .await?;
            if let Some(grand) = controlling_owner(&rs.metadata) {
                return Ok(Some(OwnerRef { kind: grand.kind.clone(), name: grand.name.clone() }));
            }
        }

        Ok(Some(OwnerRef { kind: first.kind.clone(), name: first.name.clone() }))
    }
}
