//! Error types for the runbridge-core library.

use std::time::Duration;

use thiserror::Error;

use crate::kubernetes::errors::KubectlError;

/// Result type alias for runbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by process execution, dispatch and configuration.
///
/// Probing and detection never produce these; they collapse failures into
/// `false` / `BackendKind::None` plus a logged diagnostic.
#[derive(Error, Debug)]
pub enum Error {
    /// Neither the cluster nor the container backend is usable.
    #[error("No backend available: deploy to the cluster or start the container")]
    NoBackendAvailable,

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: String,
        after: Duration,
        partial_output: Option<String>,
    },

    /// The CLI tool for a backend is missing or could not be started.
    #[error("Failed to spawn {program}: {reason}")]
    ProcessSpawnFailure { program: String, reason: String },

    /// Network-level failure reaching a backend (connection refused, reset, DNS).
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The command ran but reported an error through a working transport.
    #[error("Remote command failed: {message}")]
    RemoteCommand {
        message: String,
        output: Option<String>,
    },

    /// Cluster dispatch failed at the transport layer and the container fallback failed too.
    #[error("Cluster dispatch failed ({primary}); container fallback failed ({fallback})")]
    FailoverExhausted {
        primary: Box<Error>,
        fallback: Box<Error>,
    },

    /// The HTTP client could not be constructed (TLS backend, resolver).
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Kubernetes/kubectl error.
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] KubectlError),
}

impl Error {
    /// Whether this failure happened below the application layer and is
    /// therefore eligible for the container fallback.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::TransportFailure(_))
    }

    /// Output captured before the failure, when any was collected.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Error::Timeout { partial_output, .. } => partial_output.as_deref(),
            Error::RemoteCommand { output, .. } => output.as_deref(),
            Error::FailoverExhausted { fallback, .. } => fallback.partial_output(),
            _ => None,
        }
    }

    pub(crate) fn spawn_failure(program: impl Into<String>, reason: impl ToString) -> Self {
        Error::ProcessSpawnFailure {
            program: program.into(),
            reason: reason.to_string(),
        }
    }
}
