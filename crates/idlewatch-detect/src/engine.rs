//! Step loop: seed, narrow, terminate.
//!
//! Each step asks the source for a sample one hour further back, parses
//! it under the detector's schema, and intersects the running candidate
//! set against it. A step with zero usable rows means the metrics
//! backend has no older data — the loop stops and reports how much
//! history was actually usable.

use tokio::sync::watch;
use tracing::{debug, warn};

use idle_core::{CandidateSet, LabelSchema, SampleSet};

use crate::source::SampleSource;

/// The outcome of one detection run.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Entities idle at every sampled step.
    pub candidates: CandidateSet,
    /// Steps for which the backend returned data. Saturates at the step
    /// budget; smaller when history ran out early.
    pub observed_hours: u32,
}

/// Run-level detection failures. Step-level "no data" is not an error;
/// it terminates the loop with defined semantics.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// A query failed. Any step's failure aborts the whole run; no
    /// partial result is returned for a run that could not complete its
    /// sampling.
    #[error("query at offset {offset_hours}h failed: {reason:#}")]
    Query {
        offset_hours: u32,
        reason: anyhow::Error,
    },

    /// The shutdown flag was set at a step boundary.
    #[error("detection cancelled before step {step}")]
    Cancelled { step: u32 },
}

/// A configured quiescence detector.
///
/// Depth is a parameter of the schema, not of the algorithm: the same
/// narrowing loop serves depth-2 workload keys and depth-4 route keys.
/// Two detectors share no state and may run concurrently; internally
/// each is strictly sequential, since step *i* narrows the result of
/// step *i−1*.
pub struct Detector {
    schema: LabelSchema,
    max_steps: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Detector {
    pub fn new(schema: LabelSchema, max_steps: u32) -> Self {
        Self { schema, max_steps, shutdown: None }
    }

    /// Attach a shutdown flag, checked between steps. Mid-query
    /// cancellation is the source's own concern.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn schema(&self) -> &LabelSchema {
        &self.schema
    }

    /// Run the detection loop against `source`.
    pub async fn detect<S: SampleSource>(&self, source: &S) -> Result<Detection, DetectError> {
        let mut candidates = CandidateSet::new(self.schema.depth());
        let mut observed_hours = 0;

        for step in 0..self.max_steps {
            if let Some(shutdown) = &self.shutdown
                && *shutdown.borrow()
            {
                return Err(DetectError::Cancelled { step });
            }

            let sample = source
                .fetch(step)
                .await
                .map_err(|reason| DetectError::Query { offset_hours: step, reason })?;

            for warning in &sample.warnings {
                warn!(offset_hours = step, warning = %warning, "query warning");
            }

            let parsed = SampleSet::parse(&sample.text, &self.schema);
            observed_hours = step + 1;

            if parsed.is_empty() {
                debug!(
                    offset_hours = step,
                    observed_hours, "no usable rows; history exhausted"
                );
                break;
            }

            if step == 0 {
                candidates = CandidateSet::seed(&parsed);
                debug!(seeded = candidates.len(), "candidate set seeded");
            } else {
                let removed = candidates.narrow(&parsed);
                debug!(
                    offset_hours = step,
                    removed,
                    remaining = candidates.len(),
                    "candidates narrowed"
                );
            }
        }

        Ok(Detection { candidates, observed_hours })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idle_core::EntityKey;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::source::StepSample;

    /// Replays a fixed script of responses; `Err` entries fail the step.
    struct ScriptedSource {
        steps: Vec<Result<String, String>>,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new<const N: usize>(steps: [Result<&str, &str>; N]) -> Self {
            Self {
                steps: steps
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SampleSource for ScriptedSource {
        async fn fetch(&self, offset_hours: u32) -> anyhow::Result<StepSample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.steps[offset_hours as usize] {
                Ok(text) => Ok(StepSample::new(text.clone())),
                Err(msg) => Err(anyhow::anyhow!("{msg}")),
            }
        }
    }

    fn row(ns: &str, pod: &str) -> String {
        format!("{{namespace=\"{ns}\",pod=\"{pod}\"}} => 0 @[1700000000]\n")
    }

    #[tokio::test]
    async fn seeds_from_first_sample() {
        let source = ScriptedSource::new([
            Ok(&format!("{}{}", row("ns1", "podA"), row("ns2", "podC"))[..]),
            Ok("{}"),
        ]);
        let detector = Detector::new(LabelSchema::workload(), 2);

        let detection = detector.detect(&source).await.unwrap();
        assert_eq!(detection.candidates.len(), 2);
        assert_eq!(detection.observed_hours, 2);
    }

    #[tokio::test]
    async fn first_step_error_aborts_run() {
        let source = ScriptedSource::new([Err("connection refused")]);
        let detector = Detector::new(LabelSchema::workload(), 1);

        let err = detector.detect(&source).await.unwrap_err();
        assert!(matches!(err, DetectError::Query { offset_hours: 0, .. }));
    }

    #[tokio::test]
    async fn later_step_error_also_aborts_run() {
        let source = ScriptedSource::new([
            Ok(&row("ns1", "podA")[..]),
            Err("gateway timeout"),
        ]);
        let detector = Detector::new(LabelSchema::workload(), 4);

        let err = detector.detect(&source).await.unwrap_err();
        assert!(matches!(err, DetectError::Query { offset_hours: 1, .. }));
    }

    #[tokio::test]
    async fn cancellation_checked_at_step_boundary() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let source = ScriptedSource::new([Ok(&row("ns1", "podA")[..])]);
        let detector = Detector::new(LabelSchema::workload(), 1).with_shutdown(rx);

        let err = detector.detect(&source).await.unwrap_err();
        assert!(matches!(err, DetectError::Cancelled { step: 0 }));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn zero_step_budget_yields_empty_detection() {
        let source = ScriptedSource::new([]);
        let detector = Detector::new(LabelSchema::workload(), 0);

        let detection = detector.detect(&source).await.unwrap();
        assert_eq!(detection.observed_hours, 0);
        assert!(detection.candidates.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn all_malformed_rows_terminate_like_no_data() {
        // A step whose every row is unusable contributes no keys, which
        // reads as exhausted history.
        let source = ScriptedSource::new([
            Ok(&row("ns1", "podA")[..]),
            Ok("{namespace=\"ns1\",pod=\"podA\n"),
            Ok(&row("ns1", "podA")[..]),
        ]);
        let detector = Detector::new(LabelSchema::workload(), 3);

        let detection = detector.detect(&source).await.unwrap();
        assert_eq!(detection.observed_hours, 2);
        assert_eq!(source.calls(), 2);
        assert!(detection.candidates.contains(&EntityKey::from(["ns1", "podA"])));
    }
}
