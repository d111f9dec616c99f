//! Application layer - Use case services.
//!
//! This module contains application services that orchestrate
//! domain logic and adapter interactions.
//!
//! Services are designed to be thin orchestrators that:
//! - Accept domain types as inputs
//! - Use ports (traits) for external dependencies
//! - Return domain types as outputs
//!
//! The `engine` module composes these services and owns the runtime state.

mod detector;
mod dispatcher;
mod forwards;

pub use detector::{BackendDetector, Detection};
pub use dispatcher::{
    timeout_for, CommandDispatcher, DispatchOutcome, DEFAULT_TIMEOUT, LONG_RUNNING_TIMEOUT,
};
pub use forwards::{PortForwardSupervisor, PORT_FORWARD_STABILIZATION};
