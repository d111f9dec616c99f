//! Cluster backend: pod-count probe plus the bridge API for execution.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::bridge::BridgeClient;
use super::discovery::KubernetesDiscovery;
use crate::domain::{BackendKind, BackendProbe};
use crate::error::Result;
use crate::ports::Backend;

/// Cluster strategy: usable once enough pods serve in the namespace.
pub struct ClusterBackend {
    discovery: KubernetesDiscovery,
    bridge: BridgeClient,
    namespace: String,
    min_running_pods: usize,
}

impl ClusterBackend {
    pub fn new(
        discovery: KubernetesDiscovery,
        bridge: BridgeClient,
        namespace: impl Into<String>,
        min_running_pods: usize,
    ) -> Self {
        Self {
            discovery,
            bridge,
            namespace: namespace.into(),
            min_running_pods,
        }
    }

    pub fn bridge(&self) -> &BridgeClient {
        &self.bridge
    }
}

#[async_trait]
impl Backend for ClusterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cluster
    }

    fn endpoint(&self) -> String {
        self.bridge.base_url().to_string()
    }

    async fn probe(&self) -> BackendProbe {
        if !self.discovery.is_kubectl_available() {
            return BackendProbe::unusable("kubectl not found");
        }

        match self.discovery.count_serving_pods(&self.namespace).await {
            Ok(serving) if serving >= self.min_running_pods => BackendProbe::usable(format!(
                "{} pods running in {}",
                serving, self.namespace
            )),
            Ok(serving) => BackendProbe::unusable(format!(
                "{} of {} required pods running in {}",
                serving, self.min_running_pods, self.namespace
            )),
            Err(e) if e.is_cluster_not_connected() => {
                debug!(error = %e, "cluster not connected");
                BackendProbe::unusable("cluster not connected")
            }
            Err(e) => BackendProbe::unusable(e.to_string()),
        }
    }

    async fn confirm(&self) -> bool {
        self.probe().await.usable && self.bridge.is_healthy().await
    }

    async fn execute(
        &self,
        command: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.bridge.exec(command, timeout, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, ProcessOutput};
    use crate::ports::CommandRunner;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct PodsRunner(usize);

    #[async_trait]
    impl CommandRunner for PodsRunner {
        async fn run(
            &self,
            _spec: &CommandSpec,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<ProcessOutput> {
            let items: Vec<_> = (0..self.0)
                .map(|i| {
                    serde_json::json!({
                        "metadata": {"name": format!("pod-{}", i), "namespace": "devstack"},
                        "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}
                    })
                })
                .collect();
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: serde_json::json!({ "items": items }).to_string(),
                ..Default::default()
            })
        }
    }

    fn backend(pods: usize, min: usize) -> ClusterBackend {
        let discovery = KubernetesDiscovery::with_path(
            Some(PathBuf::from("/usr/bin/kubectl")),
            Arc::new(PodsRunner(pods)),
        );
        ClusterBackend::new(
            discovery,
            BridgeClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap(),
            "devstack",
            min,
        )
    }

    #[tokio::test]
    async fn test_probe_requires_threshold() {
        assert!(backend(3, 3).probe().await.usable);
        let short = backend(2, 3).probe().await;
        assert!(!short.usable);
        assert!(short.detail.contains("2 of 3"));
    }

    #[tokio::test]
    async fn test_confirm_needs_bridge_health() {
        // Pods are up but nothing answers on the bridge port.
        assert!(!backend(5, 3).confirm().await);
    }

    #[test]
    fn test_endpoint_is_bridge_url() {
        assert_eq!(backend(0, 3).endpoint(), "http://127.0.0.1:9");
    }
}
