//! Kubernetes discovery using kubectl commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::errors::{KubectlError, Result};
use super::models::{KubernetesPod, PodListResponse};
use crate::domain::CommandSpec;
use crate::ports::CommandRunner;

/// Timeout for kubectl discovery commands.
pub const KUBECTL_TIMEOUT: Duration = Duration::from_secs(15);

/// Kubernetes discovery service.
pub struct KubernetesDiscovery {
    kubectl_path: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl KubernetesDiscovery {
    /// Creates a discovery service for an already-resolved kubectl path.
    ///
    /// `None` means kubectl is unavailable; nothing is searched here.
    pub fn with_path(kubectl_path: Option<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            kubectl_path,
            runner,
        }
    }

    /// Returns the kubectl path if found.
    pub fn kubectl_path(&self) -> Option<&PathBuf> {
        self.kubectl_path.as_ref()
    }

    /// Returns true if kubectl is available.
    pub fn is_kubectl_available(&self) -> bool {
        self.kubectl_path.is_some()
    }

    /// Fetches pods in a namespace.
    pub async fn fetch_pods(&self, namespace: &str) -> Result<Vec<KubernetesPod>> {
        let output = self
            .execute_kubectl(&[
                "get",
                "pods",
                "-n",
                namespace,
                "-o",
                "json",
                "--request-timeout=10s",
            ])
            .await?;

        let response: PodListResponse = serde_json::from_str(&output)
            .map_err(|e| KubectlError::ParsingFailed(e.to_string()))?;

        let mut pods = response.into_pods();
        pods.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(pods)
    }

    /// Counts pods that are running with every container ready.
    pub async fn count_serving_pods(&self, namespace: &str) -> Result<usize> {
        Ok(self
            .fetch_pods(namespace)
            .await?
            .iter()
            .filter(|pod| pod.is_serving())
            .count())
    }

    /// Executes a kubectl command and returns its stdout.
    async fn execute_kubectl(&self, args: &[&str]) -> Result<String> {
        let kubectl_path = self
            .kubectl_path
            .as_ref()
            .ok_or(KubectlError::KubectlNotFound)?;

        let spec = CommandSpec::new(kubectl_path).args(args.iter().copied());
        let output = self
            .runner
            .run(&spec, KUBECTL_TIMEOUT, &CancellationToken::new())
            .await
            .map_err(|e| KubectlError::CommandFailed(e.to_string()))?;

        if output.timed_out {
            Err(KubectlError::Timeout)
        } else if output.success() {
            Ok(output.stdout)
        } else {
            Err(KubectlError::from_kubectl_error(&output.stderr))
        }
    }
}
