//! Cluster credential configuration.
//!
//! Two modes, mirroring where the process runs: inside the cluster the
//! standard service-account mount provides token and CA; outside it the
//! API server address and bearer token come from flags or environment
//! variables. Kubeconfig-file parsing is deliberately not implemented —
//! credential acquisition is outside the detector's scope.

use std::env;
use std::path::Path;

use crate::error::DirectoryError;

const SERVICE_ACCOUNT_ROOT: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved connection parameters for the cluster API.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// API server base, e.g. `https://10.96.0.1:443`.
    pub server: String,
    /// Bearer token, when the API requires one.
    pub token: Option<String>,
    /// PEM-encoded CA bundle for the API server certificate.
    pub ca_cert_pem: Option<Vec<u8>>,
}

impl ClusterConfig {
    /// In-cluster mode: service-account token and CA from the standard
    /// mount, API host and port from the injected environment.
    pub fn in_cluster() -> Result<Self, DirectoryError> {
        let host = env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| DirectoryError::Config("KUBERNETES_SERVICE_HOST not set".to_string()))?;
        let port = env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| DirectoryError::Config("KUBERNETES_SERVICE_PORT not set".to_string()))?;
        Self::in_cluster_at(Path::new(SERVICE_ACCOUNT_ROOT), &host, &port)
    }

    /// In-cluster resolution against an explicit service-account mount.
    pub fn in_cluster_at(root: &Path, host: &str, port: &str) -> Result<Self, DirectoryError> {
        let token = std::fs::read_to_string(root.join("token")).map_err(|e| {
            DirectoryError::Config(format!("read service account token: {e}"))
        })?;
        let ca_cert_pem = std::fs::read(root.join("ca.crt")).map_err(|e| {
            DirectoryError::Config(format!("read service account CA: {e}"))
        })?;

        Ok(Self {
            server: format!("https://{host}:{port}"),
            token: Some(token.trim().to_string()),
            ca_cert_pem: Some(ca_cert_pem),
        })
    }

    /// Out-of-cluster mode: `server` from a flag or `KUBE_API_SERVER`,
    /// bearer token from `token_file` or `KUBE_API_TOKEN`.
    pub fn out_of_cluster(
        server: Option<&str>,
        token_file: Option<&Path>,
    ) -> Result<Self, DirectoryError> {
        let server = match server {
            Some(s) => s.to_string(),
            None => env::var("KUBE_API_SERVER").map_err(|_| {
                DirectoryError::Config(
                    "no API server: pass --kube-server or set KUBE_API_SERVER".to_string(),
                )
            })?,
        };

        let token = match token_file {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .map_err(|e| DirectoryError::Config(format!("read token file: {e}")))?
                    .trim()
                    .to_string(),
            ),
            None => env::var("KUBE_API_TOKEN").ok(),
        };

        Ok(Self { server, token, ca_cert_pem: None })
    }
}
