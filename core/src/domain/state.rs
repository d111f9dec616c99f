//! Runtime state domain model.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::backend::BackendKind;

/// Aggregate health of the selected backend.
///
/// Transitions: `Detecting -> Healthy | Degraded | Offline`, and from any of
/// the latter three back to `Detecting` on a re-detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthPhase {
    Detecting,
    Healthy,
    Degraded,
    Offline,
}

impl HealthPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detecting => "detecting",
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for HealthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health observation for one service, recomputed every sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub url: String,
    pub healthy: bool,
}

/// Aggregates per-service results: all healthy is `Healthy`, none healthy
/// (including an empty list) is `Offline`, anything else is `Degraded`.
pub fn aggregate(statuses: &[ServiceStatus]) -> HealthPhase {
    let healthy = statuses.iter().filter(|s| s.healthy).count();
    if healthy == 0 {
        HealthPhase::Offline
    } else if healthy == statuses.len() {
        HealthPhase::Healthy
    } else {
        HealthPhase::Degraded
    }
}

/// Why and when dispatch switched away from the cluster backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverRecord {
    pub from: BackendKind,
    pub to: BackendKind,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of the orchestrator's view of the world.
///
/// Never mutated in place: the orchestrator builds a new value and swaps it
/// in whole, observers receive shared read-only copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeState {
    pub backend: BackendKind,
    pub healthy: bool,
    /// Transport-specific address (bridge URL or `container:<name>`).
    pub endpoint: String,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub phase: HealthPhase,
    pub services: Vec<ServiceStatus>,
    /// When the backend was last selected by detection (or failover).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover: Option<FailoverRecord>,
}

impl RuntimeState {
    /// State at orchestrator construction: no backend, not healthy, offline.
    pub fn initial() -> Self {
        Self {
            backend: BackendKind::None,
            healthy: false,
            endpoint: String::new(),
            last_checked_at: Utc::now(),
            details: None,
            phase: HealthPhase::Offline,
            services: Vec::new(),
            detected_at: None,
            failover: None,
        }
    }

    /// Fresh state for a newly detected backend, pending its first sweep.
    pub fn detected(backend: BackendKind, endpoint: String, details: Option<String>) -> Self {
        let now = Utc::now();
        let phase = if backend.is_available() {
            HealthPhase::Detecting
        } else {
            HealthPhase::Offline
        };
        Self {
            backend,
            healthy: false,
            endpoint,
            last_checked_at: now,
            details,
            phase,
            services: Vec::new(),
            detected_at: Some(now),
            failover: None,
        }
    }

    /// Copy of this state carrying a new sweep result.
    pub fn with_health(&self, services: Vec<ServiceStatus>) -> Self {
        let phase = if self.backend.is_available() {
            aggregate(&services)
        } else {
            HealthPhase::Offline
        };
        Self {
            healthy: self.backend.is_available() && phase == HealthPhase::Healthy,
            phase,
            services,
            last_checked_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Whether the detection result is older than `threshold` (or missing).
    pub fn is_stale(&self, threshold: Duration) -> bool {
        match self.detected_at {
            Some(at) => Utc::now()
                .signed_duration_since(at)
                .to_std()
                .map(|age| age > threshold)
                .unwrap_or(false),
            None => true,
        }
    }

    pub fn healthy_count(&self) -> usize {
        self.services.iter().filter(|s| s.healthy).count()
    }
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::initial()
    }
}
