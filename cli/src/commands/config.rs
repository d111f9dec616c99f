//! Config command - show configuration.

use anyhow::Result;
use runbridge_core::ConfigStore;

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let settings = super::load_settings().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    println!("Configuration file: {}", store.config_path().display());
    println!();
    println!(
        "Pinned backend:  {}",
        settings
            .pinned_backend
            .map(|b| b.to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Namespace:       {}", settings.namespace);
    println!("Container:       {}", settings.container_name);
    println!("Min pods:        {}", settings.min_running_pods);
    println!(
        "Intervals:       detect {}s, sweep {}s, stale after {}s",
        settings.detect_interval_secs, settings.sweep_interval_secs, settings.staleness_secs
    );
    println!("Probe timeout:   {}ms", settings.probe_timeout_ms);
    if let Some(path) = &settings.kubectl_path {
        println!("kubectl:         {}", path.display());
    }
    if let Some(path) = &settings.container_cli_path {
        println!("Container CLI:   {}", path.display());
    }

    println!();
    println!(
        "{:<14} {:<6} {:<6} {:<6} {:<20} HEALTH",
        "SERVICE", "LOCAL", "ALT", "REMOTE", "ADDRESS"
    );
    println!("{}", "-".repeat(70));
    for service in &settings.services {
        let marker = if service.name == settings.bridge_service {
            " (bridge)"
        } else {
            ""
        };
        println!(
            "{:<14} {:<6} {:<6} {:<6} {:<20} {}{}",
            service.name,
            service.local_port,
            service.alternate_port,
            service.remote_port,
            service.logical_address,
            service.health_path,
            marker
        );
    }
    Ok(())
}

pub fn path() -> Result<()> {
    let store = ConfigStore::new()?;
    println!("{}", store.config_path().display());
    Ok(())
}
