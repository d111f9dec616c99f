//! Command dispatch with one level of cluster-to-container failover.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{BackendKind, FailoverRecord};
use crate::error::{Error, Result};
use crate::ports::Backend;

/// Dispatch timeout for ordinary commands.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Dispatch timeout for commands flagged as long-running.
pub const LONG_RUNNING_TIMEOUT: Duration = Duration::from_secs(300);

pub fn timeout_for(long_running: bool) -> Duration {
    if long_running {
        LONG_RUNNING_TIMEOUT
    } else {
        DEFAULT_TIMEOUT
    }
}

/// Successful dispatch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub output: String,
    /// Backend that actually produced `output`.
    pub backend: BackendKind,
    /// Set when the cluster failed at the transport layer and the container answered.
    pub failover: Option<FailoverRecord>,
}

/// Routes commands to the strategy for the selected backend.
pub struct CommandDispatcher {
    cluster: Arc<dyn Backend>,
    container: Arc<dyn Backend>,
}

impl CommandDispatcher {
    pub fn new(cluster: Arc<dyn Backend>, container: Arc<dyn Backend>) -> Self {
        Self { cluster, container }
    }

    /// Runs `command` on `backend`.
    ///
    /// [`BackendKind::None`] fails with [`Error::NoBackendAvailable`] without
    /// touching either strategy.
    pub async fn dispatch(
        &self,
        backend: BackendKind,
        command: &str,
        cancel: &CancellationToken,
        long_running: bool,
    ) -> Result<DispatchOutcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let timeout = timeout_for(long_running);

        match backend {
            BackendKind::None => Err(Error::NoBackendAvailable),
            BackendKind::Container => {
                let output = self.container.execute(command, timeout, cancel).await?;
                Ok(DispatchOutcome {
                    output,
                    backend,
                    failover: None,
                })
            }
            BackendKind::Cluster => match self.cluster.execute(command, timeout, cancel).await {
                Ok(output) => Ok(DispatchOutcome {
                    output,
                    backend,
                    failover: None,
                }),
                Err(primary) if primary.is_transport() && !cancel.is_cancelled() => {
                    self.fail_over(primary, command, timeout, cancel).await
                }
                Err(e) => Err(e),
            },
        }
    }

    /// The single container attempt after a cluster transport failure.
    async fn fail_over(
        &self,
        primary: Error,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        warn!(error = %primary, "cluster transport failure; trying container");

        let probe = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            probe = self.container.probe() => probe,
        };
        if !probe.usable {
            return Err(Error::FailoverExhausted {
                primary: Box::new(primary),
                fallback: Box::new(Error::TransportFailure(format!(
                    "container backend unavailable: {}",
                    probe.detail
                ))),
            });
        }

        match self.container.execute(command, timeout, cancel).await {
            Ok(output) => {
                info!("command served by container after cluster failure");
                Ok(DispatchOutcome {
                    output,
                    backend: BackendKind::Container,
                    failover: Some(FailoverRecord {
                        from: BackendKind::Cluster,
                        to: BackendKind::Container,
                        reason: primary.to_string(),
                        at: Utc::now(),
                    }),
                })
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(fallback) => Err(Error::FailoverExhausted {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            }),
        }
    }
}
