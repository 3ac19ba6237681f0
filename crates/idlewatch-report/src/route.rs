//! Idle-route resolution.
//!
//! Each surviving depth-4 candidate names an ingress rule entry
//! (namespace, ingress, host, path). Resolution walks the chain the
//! directory exposes: rule → backend service, service → selector,
//! selector → backing pods, so the report shows what an idle route is
//! still keeping warm.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, warn};

use idlewatch_cluster::{Directory, RouteBackend};
use idlewatch_detect::Detection;

/// One idle route with whatever resolved behind it.
#[derive(Debug, Clone, Serialize)]
pub struct RouteFinding {
    pub namespace: String,
    pub ingress: String,
    pub host: String,
    pub path: String,
    /// Backend service for this host+path, when still present.
    pub backend: Option<RouteBackend>,
    /// Pods matched by the backend service's selector, when resolvable.
    pub backing_pods: Option<u32>,
}

/// Aggregated idle-route report.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub requested_hours: u32,
    pub observed_hours: u32,
    /// Routes idle across the observed period.
    pub idle_routes: u32,
    /// Distinct namespaces among the idle routes.
    pub namespaces: u32,
    /// Routes whose backend service still resolved.
    pub resolved_backends: u32,
    pub findings: Vec<RouteFinding>,
}

/// Resolve every surviving depth-4 candidate.
pub async fn route_report<D: Directory>(
    directory: &D,
    detection: &Detection,
    requested_hours: u32,
) -> RouteSummary {
    let mut summary = RouteSummary {
        requested_hours,
        observed_hours: detection.observed_hours,
        idle_routes: 0,
        namespaces: 0,
        resolved_backends: 0,
        findings: Vec::new(),
    };

    for key in detection.candidates.iter() {
        let (Some(namespace), Some(ingress), Some(host), Some(path)) = (
            key.component(0),
            key.component(1),
            key.component(2),
            key.component(3),
        ) else {
            continue;
        };

        summary.idle_routes += 1;

        let backend = match directory.ingress_backend(namespace, ingress, host, path).await {
            Ok(backend) => {
                summary.resolved_backends += 1;
                Some(backend)
            }
            Err(e) if e.is_skippable() => {
                debug!(%namespace, %ingress, %host, %path, error = %e, "idle route has no backend");
                None
            }
            Err(e) => {
                warn!(%namespace, %ingress, error = %e, "route resolution failed");
                None
            }
        };

        let backing_pods = match &backend {
            Some(backend) => backing_pod_count(directory, namespace, &backend.service_name).await,
            None => None,
        };

        summary.findings.push(RouteFinding {
            namespace: namespace.to_string(),
            ingress: ingress.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            backend,
            backing_pods,
        });
    }

    summary.namespaces = summary
        .findings
        .iter()
        .map(|f| f.namespace.as_str())
        .collect::<BTreeSet<_>>()
        .len() as u32;
    summary
}

/// Count pods behind a service via its selector. Best-effort.
async fn backing_pod_count<D: Directory>(
    directory: &D,
    namespace: &str,
    service: &str,
) -> Option<u32> {
    let selector = match directory.service_selector(namespace, service).await {
        Ok(selector) if !selector.is_empty() => selector,
        Ok(_) => return Some(0),
        Err(e) => {
            debug!(%namespace, %service, error = %e, "selector resolution failed");
            return None;
        }
    };

    match directory.pods_for_selector(namespace, &selector).await {
        Ok(pods) => Some(pods.len() as u32),
        Err(e) => {
            debug!(%namespace, %service, error = %e, "pod listing failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use idle_core::{CandidateSet, EntityKey, SampleSet};
    use idlewatch_cluster::{DirectoryError, OwnerRef, PodRequests, PortRef};

    struct FakeDirectory {
        backends: BTreeMap<(String, String, String, String), RouteBackend>,
        selectors: BTreeMap<(String, String), BTreeMap<String, String>>,
        pods_by_selector: BTreeMap<String, Vec<String>>,
    }

    impl FakeDirectory {
        fn new() -> Self {
            Self {
                backends: BTreeMap::new(),
                selectors: BTreeMap::new(),
                pods_by_selector: BTreeMap::new(),
            }
        }

        fn with_backend(mut self, ns: &str, ing: &str, host: &str, path: &str, svc: &str) -> Self {
            self.backends.insert(
                (ns.to_string(), ing.to_string(), host.to_string(), path.to_string()),
                RouteBackend {
                    service_name: svc.to_string(),
                    service_port: Some(PortRef::Number(8080)),
                },
            );
            self
        }

        fn with_service(mut self, ns: &str, svc: &str, app: &str, pods: &[&str]) -> Self {
            self.selectors.insert(
                (ns.to_string(), svc.to_string()),
                BTreeMap::from([("app".to_string(), app.to_string())]),
            );
            self.pods_by_selector
                .insert(app.to_string(), pods.iter().map(|p| p.to_string()).collect());
            self
        }
    }

    impl Directory for FakeDirectory {
        async fn pod_requests(&self, ns: &str, pod: &str) -> Result<PodRequests, DirectoryError> {
            Err(DirectoryError::NotFound(format!("{ns}/{pod}")))
        }

        async fn service_selector(
            &self,
            ns: &str,
            service: &str,
        ) -> Result<BTreeMap<String, String>, DirectoryError> {
            self.selectors
                .get(&(ns.to_string(), service.to_string()))
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(service.to_string()))
        }

        async fn ingress_backend(
            &self,
            ns: &str,
            ingress: &str,
            host: &str,
            path: &str,
        ) -> Result<RouteBackend, DirectoryError> {
            self.backends
                .get(&(ns.to_string(), ingress.to_string(), host.to_string(), path.to_string()))
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(format!("{ns}/{ingress}")))
        }

        async fn pods_for_selector(
            &self,
            _ns: &str,
            selector: &BTreeMap<String, String>,
        ) -> Result<Vec<String>, DirectoryError> {
            let app = selector.get("app").cloned().unwrap_or_default();
            Ok(self.pods_by_selector.get(&app).cloned().unwrap_or_default())
        }

        async fn pod_owner(
            &self,
            _ns: &str,
            _pod: &str,
        ) -> Result<Option<OwnerRef>, DirectoryError> {
            Ok(None)
        }
    }

    fn detection(keys: &[[&str; 4]], observed_hours: u32) -> Detection {
        let sample = SampleSet::from_keys(4, keys.iter().map(|k| EntityKey::from(*k)));
        Detection { candidates: CandidateSet::seed(&sample), observed_hours }
    }

    #[tokio::test]
    async fn resolves_backend_chain() {
        let directory = FakeDirectory::new()
            .with_backend("polo", "polo-api", "polo-stage.test.com", "/", "polo-svc")
            .with_service("polo", "polo-svc", "polo", &["polo-1", "polo-2"]);

        let summary = route_report(
            &directory,
            &detection(&[["polo", "polo-api", "polo-stage.test.com", "/"]], 3),
            6,
        )
        .await;

        assert_eq!(summary.idle_routes, 1);
        assert_eq!(summary.resolved_backends, 1);
        assert_eq!(summary.namespaces, 1);

        let finding = &summary.findings[0];
        assert_eq!(finding.backend.as_ref().unwrap().service_name, "polo-svc");
        assert_eq!(finding.backing_pods, Some(2));
    }

    #[tokio::test]
    async fn missing_backend_degrades_finding_only() {
        let directory = FakeDirectory::new()
            .with_backend("a", "ing", "h", "/", "svc-a");

        let summary = route_report(
            &directory,
            &detection(&[["a", "ing", "h", "/"], ["b", "gone", "h", "/"]], 2),
            4,
        )
        .await;

        assert_eq!(summary.idle_routes, 2);
        assert_eq!(summary.resolved_backends, 1);
        assert_eq!(summary.namespaces, 2);

        let unresolved = summary.findings.iter().find(|f| f.namespace == "b").unwrap();
        assert!(unresolved.backend.is_none());
        assert!(unresolved.backing_pods.is_none());
    }

    #[tokio::test]
    async fn unresolvable_selector_leaves_pod_count_unknown() {
        let directory = FakeDirectory::new()
            .with_backend("ns", "ing", "h", "/", "headless");

        let summary = route_report(
            &directory,
            &detection(&[["ns", "ing", "h", "/"]], 1),
            1,
        )
        .await;

        assert_eq!(summary.resolved_backends, 1);
        assert_eq!(summary.findings[0].backing_pods, None);
    }
}
