//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`
//! that are not specific to Kubernetes. Each adapter handles communication
//! with one external system.

pub mod container;
pub mod executable;
pub mod probe;
pub mod process;

// Re-export main types for convenience
pub use container::ContainerBackend;
pub use probe::{HealthProber, ProbeResult};
pub use process::ProcessRunner;
