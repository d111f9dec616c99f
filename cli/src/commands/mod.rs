//! CLI subcommands and shared output helpers.

pub mod config;
pub mod detect;
pub mod exec;
pub mod forwards;
pub mod pin;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::Result;
use runbridge_core::{
    CancellationToken, ConfigStore, DeployPrompt, ForwardSnapshot, Orchestrator, RuntimeState,
    Settings,
};
use tracing::debug;

/// Settings from `~/.runbridge/config.json` with `RUNBRIDGE_*` overrides applied.
pub async fn load_settings() -> Result<Settings> {
    Ok(ConfigStore::new()?.load_effective().await?)
}

pub async fn orchestrator() -> Result<Arc<Orchestrator>> {
    let settings = load_settings().await?;
    Ok(Arc::new(Orchestrator::new(settings)?))
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            trigger.cancel();
        }
    });
    token
}

pub fn print_state(state: &RuntimeState) {
    println!("Backend:   {}", state.backend);
    println!("Phase:     {}", state.phase);
    println!("Healthy:   {}", if state.healthy { "yes" } else { "no" });
    if !state.endpoint.is_empty() {
        println!("Endpoint:  {}", state.endpoint);
    }
    if let Some(details) = &state.details {
        println!("Details:   {}", details);
    }
    if let Some(failover) = &state.failover {
        println!(
            "Failover:  {} -> {} at {} ({})",
            failover.from,
            failover.to,
            failover.at.format("%H:%M:%S"),
            failover.reason
        );
    }
    println!(
        "Checked:   {}",
        state.last_checked_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );

    if state.services.is_empty() {
        return;
    }

    println!();
    println!("{:<14} {:<8} URL", "SERVICE", "HEALTH");
    println!("{}", "-".repeat(60));
    for service in &state.services {
        println!(
            "{:<14} {:<8} {}",
            service.name,
            if service.healthy { "up" } else { "down" },
            service.url
        );
    }
    println!("\nHealthy: {}/{}", state.healthy_count(), state.services.len());
}

pub fn print_forwards(forwards: &[ForwardSnapshot]) {
    if forwards.is_empty() {
        println!("No port-forwards running.");
        return;
    }

    println!(
        "{:<14} {:<6} {:<8} {:<9} {:<9} STARTED",
        "SERVICE", "PORT", "PID", "STATE", "RESTARTS"
    );
    println!("{}", "-".repeat(64));
    for forward in forwards {
        println!(
            "{:<14} {:<6} {:<8} {:<9} {:<9} {}",
            forward.service,
            forward.local_port,
            forward.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            forward.state.as_str(),
            forward.restarts,
            forward.started_at.with_timezone(&chrono::Local).format("%H:%M:%S")
        );
    }
}

pub fn print_prompt(prompt: &DeployPrompt) {
    eprintln!("{}", prompt.message);
    eprintln!();
    eprintln!("To continue, either:");
    for option in &prompt.options {
        eprintln!("  - {}: {}", option.label, option.hint);
    }
}
