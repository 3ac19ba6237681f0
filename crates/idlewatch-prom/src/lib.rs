//! Prometheus HTTP API client.
//!
//! Issues instant queries at backward-shifted timestamps and renders the
//! resulting instant vector into the row grammar the detection engine
//! consumes. Each query is bounded by an independent per-call timeout
//! and fully resolved before the step returns.

pub mod client;
pub mod response;

pub use client::{PromClient, PromError, PromQuery};
