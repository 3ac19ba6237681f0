//! Report aggregation.
//!
//! Resolves the candidates that survived a detection run against the
//! cluster directory and totals what their reservations hold. An entity
//! that disappeared between detection and resolution is logged and
//! skipped; a summary is always produced from whatever resolved.

pub mod route;
pub mod workload;

pub use route::{RouteFinding, RouteSummary, route_report};
pub use workload::{WorkloadFinding, WorkloadSummary, workload_report};
