//! kubectl port-forward command construction and output parsing.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::ServiceTarget;
use crate::domain::CommandSpec;
use crate::error::{Error, Result};
use crate::ports::ForwardLauncher;

/// Builds `kubectl port-forward` commands bound to loopback.
#[derive(Debug, Clone)]
pub struct KubectlForwardLauncher {
    kubectl_path: Option<PathBuf>,
    namespace: String,
}

impl KubectlForwardLauncher {
    pub fn new(kubectl_path: Option<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            kubectl_path,
            namespace: namespace.into(),
        }
    }
}

impl ForwardLauncher for KubectlForwardLauncher {
    fn command(&self, target: &ServiceTarget) -> Result<CommandSpec> {
        let kubectl_path = self
            .kubectl_path
            .as_ref()
            .ok_or_else(|| Error::spawn_failure("kubectl", "kubectl not found"))?;

        Ok(CommandSpec::new(kubectl_path).args([
            "port-forward".to_string(),
            "-n".to_string(),
            self.namespace.clone(),
            target.logical_address.clone(),
            format!("{}:{}", target.local_port, target.remote_port),
            "--address=127.0.0.1".to_string(),
        ]))
    }
}

// ============================================================================
// Output Parsing
// ============================================================================

/// Checks if a line indicates an error.
pub fn is_error_line(line: &str) -> bool {
    let line_lower = line.to_lowercase();
    line_lower.contains("error")
        || line_lower.contains("failed")
        || line_lower.contains("unable to")
        || line_lower.contains("connection refused")
        || line_lower.contains("lost connection")
        || line_lower.contains("an error occurred")
}

fn bind_port_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    // `127.0.0.1:8080:` or `[::1]:8080:`
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?:\d{1,3}(?:\.\d{1,3}){3}|\[[0-9a-fA-F:]*\]):(\d{1,5})\b").ok()
        })
        .as_ref()
}

/// Detects port conflict from output line.
/// Returns the conflicting port if detected.
pub fn detect_port_conflict(line: &str) -> Option<u16> {
    // kubectl format: "listen tcp4 127.0.0.1:8080: bind: address already in use"
    // kubectl v6 format: "listen tcp6 [::1]:8080: bind: address already in use"
    if !line.to_lowercase().contains("address already in use") {
        return None;
    }

    bind_port_pattern()?
        .captures_iter(line)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u16>().ok())
        .find(|port| *port > 0)
}
