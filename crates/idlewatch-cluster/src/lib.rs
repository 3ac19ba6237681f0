//! Kubernetes resource directory client.
//!
//! Resolves the entities a detection run surfaces: pod resource
//! requests, service selectors, ingress backends, and owning
//! controllers. Every lookup is a simple keyed read with "not found" as
//! a recoverable, loggable condition — never a detector concern.

pub mod client;
pub mod config;
pub mod error;
pub mod objects;
pub mod quantity;

pub use client::{Directory, DirectoryClient};
pub use config::ClusterConfig;
pub use error::DirectoryError;
pub use objects::{OwnerRef, PodRequests, PortRef, RouteBackend};
