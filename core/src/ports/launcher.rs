//! Port-forward launcher port (interface).

use crate::config::ServiceTarget;
use crate::domain::CommandSpec;
use crate::error::Result;

/// Port for building the long-lived command that forwards one service.
///
/// The supervisor owns spawning and lifecycle; launchers only decide argv,
/// which keeps the supervisor testable with plain processes.
pub trait ForwardLauncher: Send + Sync {
    /// Command that binds `127.0.0.1:<local_port>` to the service's remote port.
    fn command(&self, target: &ServiceTarget) -> Result<CommandSpec>;
}
