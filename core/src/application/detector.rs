//! Backend detection.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{BackendKind, BackendProbe};
use crate::ports::Backend;

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: BackendKind,
    /// Why this backend was chosen, or why none was.
    pub detail: String,
}

impl Detection {
    fn selected(kind: BackendKind, probe: &BackendProbe) -> Self {
        Self {
            kind,
            detail: probe.detail.clone(),
        }
    }
}

/// Decides which backend is usable, in priority order.
///
/// Never fails: every problem becomes an unusable probe with a diagnostic.
pub struct BackendDetector {
    cluster: Arc<dyn Backend>,
    container: Arc<dyn Backend>,
}

impl BackendDetector {
    pub fn new(cluster: Arc<dyn Backend>, container: Arc<dyn Backend>) -> Self {
        Self { cluster, container }
    }

    /// Strategy object for `kind`; `None` for [`BackendKind::None`].
    pub fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn Backend>> {
        match kind {
            BackendKind::Cluster => Some(&self.cluster),
            BackendKind::Container => Some(&self.container),
            BackendKind::None => None,
        }
    }

    /// Runs detection.
    ///
    /// `pinned` is tried alone first and is only a preference. With
    /// `after_failover` set, the container is preferred until the cluster
    /// passes the stronger [`Backend::confirm`] check.
    pub async fn detect(&self, pinned: Option<BackendKind>, after_failover: bool) -> Detection {
        if let Some(kind) = pinned {
            if let Some(backend) = self.backend(kind) {
                let probe = backend.probe().await;
                if probe.usable {
                    info!(backend = %kind, detail = %probe.detail, "pinned backend usable");
                    return Detection::selected(kind, &probe);
                }
                debug!(backend = %kind, detail = %probe.detail, "pinned backend unusable; auto-detecting");
            }
        }

        let mut container_probe = None;
        if after_failover {
            let probe = self.container.probe().await;
            if probe.usable {
                if self.cluster.confirm().await {
                    info!("cluster re-confirmed after failover");
                    return Detection {
                        kind: BackendKind::Cluster,
                        detail: "cluster re-confirmed".to_string(),
                    };
                }
                debug!("cluster not re-confirmed; staying on container");
                return Detection::selected(BackendKind::Container, &probe);
            }
            container_probe = Some(probe);
        }

        let cluster_probe = self.cluster.probe().await;
        if cluster_probe.usable {
            return Detection::selected(BackendKind::Cluster, &cluster_probe);
        }
        debug!(detail = %cluster_probe.detail, "cluster backend unusable");

        let container_probe = match container_probe {
            Some(probe) => probe,
            None => self.container.probe().await,
        };
        if container_probe.usable {
            return Detection::selected(BackendKind::Container, &container_probe);
        }
        debug!(detail = %container_probe.detail, "container backend unusable");

        Detection {
            kind: BackendKind::None,
            detail: format!(
                "cluster: {}; container: {}",
                cluster_probe.detail, container_probe.detail
            ),
        }
    }
}
