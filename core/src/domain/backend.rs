//! Backend kind domain model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The execution environment a dispatched command runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Kubernetes cluster reached through port-forwards and the bridge API.
    Cluster,
    /// Local container reached through the container CLI.
    Container,
    /// Nothing usable was detected.
    #[default]
    None,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Container => "container",
            Self::None => "none",
        }
    }

    /// Whether commands can be dispatched to this backend at all.
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cluster" | "kubernetes" | "k8s" => Ok(Self::Cluster),
            "container" | "docker" => Ok(Self::Container),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown backend '{}'; expected cluster, container or none",
                other
            )),
        }
    }
}

/// Result of probing a single backend during detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProbe {
    pub usable: bool,
    /// Human-readable diagnostic (e.g. "4/3 pods running").
    pub detail: String,
}

impl BackendProbe {
    pub fn usable(detail: impl Into<String>) -> Self {
        Self {
            usable: true,
            detail: detail.into(),
        }
    }

    pub fn unusable(detail: impl Into<String>) -> Self {
        Self {
            usable: false,
            detail: detail.into(),
        }
    }
}
