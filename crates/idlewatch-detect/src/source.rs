//! The engine's sole I/O boundary.

use std::future::Future;

/// One step's raw query response.
///
/// `text` is the newline-separated row grammar consumed by the sample
/// parser; `warnings` came back with the query and are logged by the
/// engine, never fatal.
#[derive(Debug, Clone, Default)]
pub struct StepSample {
    pub text: String,
    pub warnings: Vec<String>,
}

impl StepSample {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), warnings: Vec::new() }
    }
}

/// Supplies the raw response for each backward-shifted step.
///
/// The engine never knows how the response was obtained (HTTP against a
/// live metrics backend, a file, or an in-memory fixture), which keeps
/// detection deterministic under test. Implementations must resolve (or
/// fail) each call before returning; any per-call resource is scoped to
/// that call.
pub trait SampleSource {
    /// Fetch the response for the sample taken `offset_hours` before now.
    fn fetch(
        &self,
        offset_hours: u32,
    ) -> impl Future<Output = anyhow::Result<StepSample>> + Send;
}
