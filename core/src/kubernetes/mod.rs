//! Kubernetes module: cluster backend, bridge client and port forwarding.
//!
//! This module provides:
//! - Pod discovery via kubectl
//! - The cluster execution strategy (bridge HTTP API)
//! - kubectl port-forward command construction and stderr parsing

pub mod backend;
pub mod bridge;
pub mod discovery;
pub mod errors;
pub mod models;
pub mod port_forward;

// Re-export commonly used types
pub use backend::ClusterBackend;
pub use bridge::BridgeClient;
pub use discovery::KubernetesDiscovery;
pub use errors::{KubectlError, Result};
pub use models::{BridgeExecRequest, BridgeExecResponse, BridgeHealth, KubernetesPod};
pub use port_forward::KubectlForwardLauncher;
