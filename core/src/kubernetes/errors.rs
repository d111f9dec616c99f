//! Errors reported by kubectl.

use thiserror::Error;

/// Result type alias for kubectl operations.
pub type Result<T> = std::result::Result<T, KubectlError>;

/// Failures of a kubectl invocation, classified from its stderr.
#[derive(Error, Debug)]
pub enum KubectlError {
    /// kubectl could not be located.
    #[error("kubectl not found")]
    KubectlNotFound,

    /// kubectl did not finish within its deadline.
    #[error("kubectl timed out")]
    Timeout,

    /// The API server is unreachable or no kubeconfig is set.
    #[error("Cluster not connected: {0}")]
    ClusterNotConnected(String),

    /// RBAC denied the request.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The namespace or resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-zero exit.
    #[error("kubectl command failed: {0}")]
    CommandFailed(String),

    /// kubectl output could not be decoded.
    #[error("Failed to parse kubectl output: {0}")]
    ParsingFailed(String),
}

impl KubectlError {
    /// Classifies kubectl stderr.
    pub fn from_kubectl_error(stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        let lower = message.to_lowercase();

        if lower.contains("connection refused")
            || lower.contains("no configuration has been provided")
            || lower.contains("dial tcp")
            || lower.contains("unable to connect to the server")
        {
            KubectlError::ClusterNotConnected(message)
        } else if lower.contains("forbidden") {
            KubectlError::Forbidden(message)
        } else if lower.contains("notfound") || lower.contains("not found") {
            KubectlError::NotFound(message)
        } else {
            KubectlError::CommandFailed(message)
        }
    }

    /// Returns true if the error indicates the cluster is unreachable.
    pub fn is_cluster_not_connected(&self) -> bool {
        matches!(self, KubectlError::ClusterNotConnected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubectl_error_detection() {
        let connection_refused = KubectlError::from_kubectl_error("connection refused");
        assert!(connection_refused.is_cluster_not_connected());

        let no_config = KubectlError::from_kubectl_error("no configuration has been provided");
        assert!(no_config.is_cluster_not_connected());

        let dial_error = KubectlError::from_kubectl_error("dial tcp 127.0.0.1:6443: connect");
        assert!(dial_error.is_cluster_not_connected());

        let other_error = KubectlError::from_kubectl_error("some other error");
        assert!(!other_error.is_cluster_not_connected());
    }

    #[test]
    fn test_forbidden_and_not_found() {
        assert!(matches!(
            KubectlError::from_kubectl_error(
                "Error from server (Forbidden): pods is forbidden: User \"dev\" cannot list"
            ),
            KubectlError::Forbidden(_)
        ));
        assert!(matches!(
            KubectlError::from_kubectl_error(
                "Error from server (NotFound): namespaces \"devstack\" not found"
            ),
            KubectlError::NotFound(_)
        ));
    }
}
