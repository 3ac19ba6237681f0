//! HTTP client for the query API.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use idlewatch_detect::{SampleSource, StepSample};

use crate::response::{Envelope, VectorSample, render_instant_vector};

/// Errors from the metrics backend or its transport.
#[derive(Debug, thiserror::Error)]
pub enum PromError {
    #[error("invalid metrics endpoint URI {uri:?}: {reason}")]
    BadUri { uri: String, reason: String },

    #[error("metrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics backend returned {error_type}: {message}")]
    Api { error_type: String, message: String },

    #[error("unexpected result type {0:?} (want vector)")]
    UnexpectedResultType(String),

    #[error("malformed query response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Client for a Prometheus-compatible query API endpoint.
#[derive(Debug, Clone)]
pub struct PromClient {
    http: reqwest::Client,
    base: reqwest::Url,
}

impl PromClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Build a client for `base_uri` with a fixed per-call timeout.
    ///
    /// The timeout bounds each query independently; a step's request is
    /// fully resolved or failed before the next step starts, so nothing
    /// query-scoped is ever held across steps.
    pub fn new(base_uri: &str, timeout: Duration) -> Result<Self, PromError> {
        let mut base = reqwest::Url::parse(base_uri).map_err(|e| PromError::BadUri {
            uri: base_uri.to_string(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    /// Run one instant query evaluated at `epoch_secs`.
    ///
    /// Returns the vector rendered as row text plus any backend
    /// warnings.
    pub async fn query_at(
        &self,
        promql: &str,
        epoch_secs: u64,
    ) -> Result<(String, Vec<String>), PromError> {
        let url = self.base.join("api/v1/query").map_err(|e| PromError::BadUri {
            uri: self.base.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, time = epoch_secs, "instant query");

        let time = epoch_secs.to_string();
        let envelope: Envelope = self
            .http
            .get(url)
            .query(&[("query", promql), ("time", time.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.status != "success" {
            return Err(PromError::Api {
                error_type: envelope.error_type.unwrap_or_else(|| "unknown".to_string()),
                message: envelope.error.unwrap_or_default(),
            });
        }

        let data = envelope.data.ok_or_else(|| PromError::Api {
            error_type: "missing_data".to_string(),
            message: "success response without data".to_string(),
        })?;
        if data.result_type != "vector" {
            return Err(PromError::UnexpectedResultType(data.result_type));
        }

        let samples: Vec<VectorSample> = serde_json::from_value(data.result)?;
        Ok((render_instant_vector(&samples), envelope.warnings))
    }

    /// Pair this client with a query predicate to obtain a detector
    /// source.
    pub fn source(&self, promql: impl Into<String>) -> PromQuery {
        PromQuery { client: self.clone(), promql: promql.into() }
    }
}

/// A PromQL predicate bound to a client; the production [`SampleSource`].
///
/// The predicate already encodes "zero activity over a rolling window,
/// grouped by the schema's components"; the source only shifts the
/// evaluation timestamp backward per step.
#[derive(Debug, Clone)]
pub struct PromQuery {
    client: PromClient,
    promql: String,
}

impl SampleSource for PromQuery {
    async fn fetch(&self, offset_hours: u32) -> anyhow::Result<StepSample> {
        let at = epoch_secs().saturating_sub(u64::from(offset_hours) * 3600);
        let (text, warnings) = self.client.query_at(&self.promql, at).await?;
        Ok(StepSample { text, warnings })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_uri_gets_trailing_slash() {
        let client = PromClient::new("http://localhost:9091", PromClient::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base.path(), "/");

        let client =
            PromClient::new("http://localhost:9091/prom", PromClient::DEFAULT_TIMEOUT).unwrap();
        assert_eq!(client.base.path(), "/prom/");
        assert_eq!(
            client.base.join("api/v1/query").unwrap().path(),
            "/prom/api/v1/query"
        );
    }

    #[test]
    fn rejects_malformed_uri() {
        let err = PromClient::new("not a uri", PromClient::DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, PromError::BadUri { .. }));
    }
}
