//! The windowed quiescence engine.
//!
//! Drives repeated, backward-shifted metrics queries through an injected
//! [`SampleSource`], narrowing a candidate set to the entities that were
//! idle at every sampled step, and stops early once historical data runs
//! out. The engine performs no I/O of its own and holds no state across
//! runs.

pub mod engine;
pub mod source;

pub use engine::{DetectError, Detection, Detector};
pub use source::{SampleSource, StepSample};
