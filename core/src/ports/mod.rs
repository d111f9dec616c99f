//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `adapters`
//! and `kubernetes`.

mod backend;
mod launcher;
mod runner;

pub use backend::Backend;
pub use launcher::ForwardLauncher;
pub use runner::CommandRunner;
