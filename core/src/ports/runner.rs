//! Command runner port (interface).

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{CommandSpec, ProcessOutput};
use crate::error::Result;

/// Port for running a short-lived external process to completion.
///
/// Implementations never fail for a non-zero exit: exit code and captured
/// streams are always returned. A timeout also returns `Ok`, with
/// `timed_out` set and whatever output was captured so far.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec`, terminating it on timeout or cancellation.
    ///
    /// Returns `Error::ProcessSpawnFailure` if the program cannot be started
    /// and `Error::Cancelled` promptly once `cancel` fires.
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput>;
}
