//! Configuration management for backend selection and the service table.
//!
//! Stores configuration in JSON format at `~/.runbridge/config.json`.
//! Environment variables override file values (see [`Settings::apply_env`]).

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::domain::BackendKind;
use crate::error::{Error, Result};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "RUNBRIDGE_";

/// One proxied service: how it is reached locally and inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTarget {
    pub name: String,
    /// Loopback port the cluster forward binds.
    pub local_port: u16,
    /// Second loopback port the container may publish the service on.
    pub alternate_port: u16,
    /// Service port inside the cluster.
    pub remote_port: u16,
    /// kubectl resource to forward to (e.g. `svc/dashboard`).
    pub logical_address: String,
    /// Path probed by the health sweep.
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/".to_string()
}

impl ServiceTarget {
    pub fn new(
        name: &str,
        local_port: u16,
        alternate_port: u16,
        remote_port: u16,
        logical_address: &str,
        health_path: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            local_port,
            alternate_port,
            remote_port,
            logical_address: logical_address.to_string(),
            health_path: health_path.to_string(),
        }
    }

    /// `http://127.0.0.1:<port>`; never a non-loopback address.
    pub fn base_url(port: u16) -> String {
        format!("http://127.0.0.1:{}", port)
    }

    /// Health URL for this service on the given loopback port.
    pub fn health_url(&self, port: u16) -> String {
        let path = if self.health_path.starts_with('/') {
            self.health_path.clone()
        } else {
            format!("/{}", self.health_path)
        };
        format!("{}{}", Self::base_url(port), path)
    }

    /// Ports to try, in order, when the container backend is selected.
    pub fn container_ports(&self) -> Vec<u16> {
        if self.alternate_port == self.local_port {
            vec![self.local_port]
        } else {
            vec![self.local_port, self.alternate_port]
        }
    }
}

/// Default service table.
pub fn default_services() -> Vec<ServiceTarget> {
    vec![
        ServiceTarget::new("dashboard", 8080, 8081, 8080, "svc/dashboard", "/health"),
        ServiceTarget::new("inference", 11434, 11435, 11434, "svc/inference", "/api/tags"),
        ServiceTarget::new(
            "vectorstore",
            8000,
            8001,
            8000,
            "svc/vectorstore",
            "/api/v1/heartbeat",
        ),
        ServiceTarget::new("bridge", 8765, 8766, 8765, "svc/bridge", "/api/health"),
    ]
}

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Backend to try first; a preference, not a requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned_backend: Option<BackendKind>,

    /// Namespace holding the workloads and the bridge service.
    pub namespace: String,

    /// Name of the container the container backend execs into.
    pub container_name: String,

    /// Explicit kubectl path; otherwise well-known paths and `PATH` are searched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubectl_path: Option<PathBuf>,

    /// Explicit container CLI path (docker or podman).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_cli_path: Option<PathBuf>,

    /// Running pods required before the cluster counts as usable.
    pub min_running_pods: usize,

    pub detect_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub staleness_secs: u64,
    pub probe_timeout_ms: u64,

    /// Service-table entry hosting the bridge API.
    pub bridge_service: String,

    pub services: Vec<ServiceTarget>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pinned_backend: None,
            namespace: "devstack".to_string(),
            container_name: "devstack-runtime".to_string(),
            kubectl_path: None,
            container_cli_path: None,
            min_running_pods: 3,
            detect_interval_secs: 30,
            sweep_interval_secs: 20,
            staleness_secs: 60,
            probe_timeout_ms: 2000,
            bridge_service: "bridge".to_string(),
            services: default_services(),
        }
    }
}

impl Settings {
    pub fn detect_interval(&self) -> Duration {
        Duration::from_secs(self.detect_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceTarget> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn bridge_target(&self) -> Result<&ServiceTarget> {
        self.service(&self.bridge_service).ok_or_else(|| {
            Error::Config(format!(
                "bridge service '{}' is not in the service table",
                self.bridge_service
            ))
        })
    }

    /// Base URL of the bridge API through its forwarded port.
    pub fn bridge_url(&self) -> Result<String> {
        Ok(ServiceTarget::base_url(self.bridge_target()?.local_port))
    }

    /// Applies `RUNBRIDGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Applies overrides from arbitrary key/value pairs.
    ///
    /// Recognised keys: `RUNBRIDGE_BACKEND`, `RUNBRIDGE_NAMESPACE`,
    /// `RUNBRIDGE_CONTAINER`, `RUNBRIDGE_KUBECTL`, `RUNBRIDGE_CONTAINER_CLI`,
    /// `RUNBRIDGE_MIN_PODS` and `RUNBRIDGE_PORT_<SERVICE>=<local>[:<alternate>]`.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();

            match name {
                "BACKEND" => {
                    let kind: BackendKind = value.parse().map_err(Error::Config)?;
                    self.pinned_backend = kind.is_available().then_some(kind);
                }
                "NAMESPACE" => self.namespace = value.to_string(),
                "CONTAINER" => self.container_name = value.to_string(),
                "KUBECTL" => self.kubectl_path = Some(PathBuf::from(value)),
                "CONTAINER_CLI" => self.container_cli_path = Some(PathBuf::from(value)),
                "MIN_PODS" => {
                    self.min_running_pods = value.parse().map_err(|e| {
                        Error::Config(format!("invalid {}MIN_PODS '{}': {}", ENV_PREFIX, value, e))
                    })?;
                }
                other => {
                    if let Some(service) = other.strip_prefix("PORT_") {
                        self.override_ports(service, value)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn override_ports(&mut self, service: &str, value: &str) -> Result<()> {
        let target = self
            .services
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(service))
            .ok_or_else(|| Error::Config(format!("port override for unknown service '{}'", service)))?;

        let parse = |s: &str| {
            s.trim()
                .parse::<u16>()
                .map_err(|e| Error::Config(format!("invalid port '{}' for {}: {}", s, service, e)))
        };

        match value.split_once(':') {
            Some((local, alternate)) => {
                target.local_port = parse(local)?;
                target.alternate_port = parse(alternate)?;
            }
            None => target.local_port = parse(value)?,
        }
        Ok(())
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Config("service table is empty".to_string()));
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if !names.insert(service.name.as_str()) {
                return Err(Error::Config(format!("duplicate service '{}'", service.name)));
            }
            if service.local_port == 0 || service.alternate_port == 0 || service.remote_port == 0 {
                return Err(Error::Config(format!(
                    "service '{}' has a zero port",
                    service.name
                )));
            }
            if service.logical_address.trim().is_empty() {
                return Err(Error::Config(format!(
                    "service '{}' has no logical address",
                    service.name
                )));
            }
        }

        self.bridge_target()?;

        if self.detect_interval_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(Error::Config("intervals must be non-zero".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(Error::Config("probe timeout must be non-zero".to_string()));
        }
        if self.container_name.trim().is_empty() {
            return Err(Error::Config("container name is empty".to_string()));
        }

        Ok(())
    }
}

/// Configuration store for managing settings on disk.
///
/// Handles reading and writing configuration to `~/.runbridge/config.json`.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.runbridge/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".runbridge").join("config.json"),
        })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default settings if the file doesn't exist.
    pub async fn load(&self) -> Result<Settings> {
        if !self.config_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from disk, apply environment overrides and validate.
    pub async fn load_effective(&self) -> Result<Settings> {
        let mut settings = self.load().await?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save configuration to disk.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        // Write to a temp file first, then rename (atomic write)
        let temp_path = self.config_path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(settings)?;

        fs::write(&temp_path, content)
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to save config: {}", e)))?;

        Ok(())
    }

    /// Persist a backend pin (or clear it with `None`).
    pub async fn set_pinned_backend(&self, backend: Option<BackendKind>) -> Result<Settings> {
        let mut settings = self.load().await?;
        settings.pinned_backend = backend.filter(BackendKind::is_available);
        self.save(&settings).await?;
        Ok(settings)
    }
}
