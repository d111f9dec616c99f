//! Port-forward domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a single forwarding process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardState {
    /// Process spawned, local port not answering yet.
    Starting,
    /// Local port answers.
    Running,
    /// Process exited; eligible for restart on the next sweep.
    Dead,
}

impl ForwardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Dead => "dead",
        }
    }
}

/// Read-only view of a forward handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardSnapshot {
    pub id: Uuid,
    pub service: String,
    pub local_port: u16,
    pub pid: Option<u32>,
    pub state: ForwardState,
    pub restarts: u32,
    pub started_at: DateTime<Utc>,
}

/// Outcome of asking the supervisor to start a forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardStart {
    /// A new forwarding process was spawned.
    Started { id: Uuid, pid: Option<u32> },
    /// The local port already answered; nothing was spawned.
    Skipped { port: u16 },
}

impl ForwardStart {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}
