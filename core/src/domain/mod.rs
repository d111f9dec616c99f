//! Domain layer - Pure data models.
//!
//! This module contains the entities the orchestrator reasons about.
//! These types have no I/O dependencies and can be tested in isolation.

mod backend;
mod forward;
mod process;
mod state;

// Re-export all domain types
pub use backend::{BackendKind, BackendProbe};
pub use forward::{ForwardSnapshot, ForwardStart, ForwardState};
pub use process::{CommandSpec, ProcessOutput, TIMEOUT_MARKER};
pub use state::{aggregate, FailoverRecord, HealthPhase, RuntimeState, ServiceStatus};
