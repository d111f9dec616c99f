//! Kubernetes and bridge API data models.

use serde::{Deserialize, Serialize};

// ============================================================================
// Discovery Models
// ============================================================================

/// A pod as seen by the cluster probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesPod {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    /// Every container reports ready.
    pub ready: bool,
}

impl KubernetesPod {
    /// Running and ready; the only pods that count toward the threshold.
    pub fn is_serving(&self) -> bool {
        self.phase == "Running" && self.ready
    }
}

// ============================================================================
// kubectl JSON Response Parsing
// ============================================================================

/// Response structure for `kubectl get pods -o json`.
#[derive(Debug, Deserialize)]
pub struct PodListResponse {
    #[serde(default)]
    pub items: Vec<PodItem>,
}

#[derive(Debug, Deserialize)]
pub struct PodItem {
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Deserialize)]
pub struct PodMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ContainerStatus {
    #[serde(default)]
    pub ready: bool,
}

impl PodListResponse {
    /// Converts the kubectl response to a list of KubernetesPod.
    pub fn into_pods(self) -> Vec<KubernetesPod> {
        self.items
            .into_iter()
            .map(|item| {
                let statuses = &item.status.container_statuses;
                KubernetesPod {
                    name: item.metadata.name,
                    namespace: item.metadata.namespace,
                    phase: item.status.phase.unwrap_or_else(|| "Unknown".to_string()),
                    ready: !statuses.is_empty() && statuses.iter().all(|c| c.ready),
                }
            })
            .collect()
    }
}

// ============================================================================
// Bridge API
// ============================================================================

/// Body of `POST /api/exec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeExecRequest {
    pub command: String,
    /// Server-side budget in seconds.
    pub timeout: u64,
}

/// Reply from `POST /api/exec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeExecResponse {
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// `status` as the bridge reports it: an HTTP-style code or a word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthStatus {
    Code(u16),
    Text(String),
}

/// Reply from `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub status: HealthStatus,
    #[serde(default)]
    pub version: Option<String>,
}

impl BridgeHealth {
    pub fn is_ok(&self) -> bool {
        match &self.status {
            HealthStatus::Code(code) => (200..300).contains(code),
            HealthStatus::Text(text) => {
                matches!(text.to_lowercase().as_str(), "ok" | "healthy" | "200")
            }
        }
    }
}
