//! RunBridge Core Library
//!
//! Exposes a development tool's command-execution surface through whichever
//! runtime backend is currently usable: a Kubernetes cluster (reached through
//! kubectl port-forwards and an in-cluster bridge API) or a local container.
//! Provides functionality to:
//! - Detect the usable backend in priority order (pin, cluster, container)
//! - Sweep service health on a timer and aggregate it into a runtime state
//! - Supervise one kubectl port-forward per service for the cluster backend
//! - Dispatch commands with backend-specific transport and one-step failover
//! - Publish state snapshots and change events to observers
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models (backend kinds, runtime state, forwards)
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: External system implementations (processes, HTTP, docker)
//! - `kubernetes`: kubectl discovery, port-forward commands and the bridge client
//! - `application`: Detector, dispatcher and port-forward supervisor
//! - `engine`: The orchestrator that owns the runtime state

// Hexagonal architecture layers
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub mod config;
pub mod engine;
pub mod error;
pub mod kubernetes;

// Re-export domain types (primary API)
pub use domain::{
    aggregate, BackendKind, BackendProbe, CommandSpec, FailoverRecord, ForwardSnapshot,
    ForwardStart, ForwardState, HealthPhase, ProcessOutput, RuntimeState, ServiceStatus,
};

// Re-export other commonly used types
pub use application::{BackendDetector, CommandDispatcher, Detection, PortForwardSupervisor};
pub use config::{ConfigStore, ServiceTarget, Settings};
pub use engine::{DeployOption, DeployPrompt, Orchestrator, OrchestratorEvent};
pub use error::{Error, Result};

/// Cancellation signal accepted by every dispatch and process call.
pub use tokio_util::sync::CancellationToken;
