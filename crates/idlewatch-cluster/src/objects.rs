//! Minimal typed views of the API objects the directory reads.
//!
//! Only the fields idlewatch consumes are modeled; everything else in
//! the payload is ignored on deserialization.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Wire types ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "ownerReferences")]
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub controller: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub resources: Resources,
}

#[derive(Debug, Default, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
    #[serde(default)]
    pub spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct Ingress {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: IngressSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngressSpec {
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub http: Option<HttpRule>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpRule {
    #[serde(default)]
    pub paths: Vec<HttpPath>,
}

#[derive(Debug, Deserialize)]
pub struct HttpPath {
    #[serde(default)]
    pub path: String,
    pub backend: IngressBackend,
}

#[derive(Debug, Deserialize)]
pub struct IngressBackend {
    #[serde(default)]
    pub service: Option<BackendService>,
}

#[derive(Debug, Deserialize)]
pub struct BackendService {
    pub name: String,
    #[serde(default)]
    pub port: Option<BackendPort>,
}

#[derive(Debug, Deserialize)]
pub struct BackendPort {
    #[serde(default)]
    pub number: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Any object read only for its metadata (owner walking).
#[derive(Debug, Deserialize)]
pub struct MetadataOnly {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

// ── Resolved results ──────────────────────────────────────────────

/// Aggregate reserved capacity across a pod's containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PodRequests {
    /// CPU in milli-units.
    pub cpu_milli: i64,
    /// Memory in bytes.
    pub memory_bytes: i64,
}

/// Backend service for a routing rule at a given host and path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteBackend {
    pub service_name: String,
    pub service_port: Option<PortRef>,
}

/// A service port referenced by number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortRef {
    Number(i32),
    Name(String),
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRef::Number(n) => write!(f, "{n}"),
            PortRef::Name(name) => write!(f, "{name}"),
        }
    }
}

/// A controller that owns a resolved entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

// ── Pure resolution helpers ───────────────────────────────────────

/// Find the backend for `host` + `path` in an ingress spec.
///
/// A rule path equal to the requested path matches; so does an empty
/// rule path (catch-all). When several paths match, the last one wins.
pub fn find_backend(ingress: &Ingress, host: &str, path: &str) -> Option<RouteBackend> {
    let mut found = None;
    for rule in &ingress.spec.rules {
        if rule.host != host {
            continue;
        }
        let Some(http) = &rule.http else { continue };
        for entry in &http.paths {
            if entry.path == path || entry.path.is_empty() {
                found = entry.backend.service.as_ref().map(|svc| RouteBackend {
                    service_name: svc.name.clone(),
                    service_port: svc.port.as_ref().and_then(|p| match (&p.number, &p.name) {
                        (Some(n), _) => Some(PortRef::Number(*n)),
                        (None, Some(name)) => Some(PortRef::Name(name.clone())),
                        (None, None) => None,
                    }),
                });
            }
        }
    }
    found
}

/// Pick the owning reference for an object: the controller reference
/// when one is marked, otherwise the first reference listed.
pub fn controlling_owner(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .find(|r| r.controller == Some(true))
        .or_else(|| meta.owner_references.first())
}
