//! Backend strategy port (interface).

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{BackendKind, BackendProbe};
use crate::error::Result;

/// Execution strategy for one backend variant.
///
/// The detector uses `probe`/`confirm`, the dispatcher uses `execute`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Which variant this strategy serves.
    fn kind(&self) -> BackendKind;

    /// Transport-specific address recorded in the runtime state.
    fn endpoint(&self) -> String;

    /// Cheap usability check. Never fails; problems become `usable: false`.
    async fn probe(&self) -> BackendProbe;

    /// Stronger check that the backend can actually serve commands.
    ///
    /// Defaults to `probe`; the cluster strategy also checks the bridge API.
    async fn confirm(&self) -> bool {
        self.probe().await.usable
    }

    /// Run `command` on this backend and return its output.
    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String>;
}
