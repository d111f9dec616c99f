//! Watch command - run the detection/sweep loop and print changes.

use anyhow::Result;
use runbridge_core::OrchestratorEvent;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub async fn run(json: bool) -> Result<()> {
    let orchestrator = super::orchestrator().await?;
    let mut events = orchestrator.subscribe();
    let cancel = super::cancel_on_ctrl_c();
    let worker = orchestrator.clone().spawn();

    if !json {
        println!("Watching runtime backends (Ctrl-C to stop)...");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, json)?,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.shutdown().await;
    if let Err(e) = worker.await {
        warn!(error = %e, "orchestrator loop ended abnormally");
    }
    Ok(())
}

fn print_event(event: &OrchestratorEvent, json: bool) -> Result<()> {
    let now = chrono::Local::now().format("%H:%M:%S");

    if json {
        let value = match event {
            OrchestratorEvent::Snapshot(state) => json!({ "event": "snapshot", "state": &**state }),
            OrchestratorEvent::BackendChanged { from, to, reason } => {
                json!({ "event": "backendChanged", "from": from, "to": to, "reason": reason })
            }
            OrchestratorEvent::HealthChanged {
                backend,
                from,
                to,
                healthy,
            } => json!({
                "event": "healthChanged",
                "backend": backend,
                "from": from,
                "to": to,
                "healthy": healthy,
            }),
            OrchestratorEvent::ActionRequired(prompt) => {
                json!({ "event": "actionRequired", "prompt": prompt })
            }
        };
        println!("{}", serde_json::to_string(&value)?);
        return Ok(());
    }

    match event {
        // Snapshots arrive every sweep; only transitions are printed.
        OrchestratorEvent::Snapshot(_) => {}
        OrchestratorEvent::BackendChanged { from, to, reason } => {
            println!("[{}] backend {} -> {} ({})", now, from, to, reason);
        }
        OrchestratorEvent::HealthChanged { backend, to, healthy, .. } => {
            println!(
                "[{}] {} is {}{}",
                now,
                backend,
                to,
                if *healthy { "" } else { " (not healthy)" }
            );
        }
        OrchestratorEvent::ActionRequired(prompt) => {
            println!("[{}] action required", now);
            super::print_prompt(prompt);
        }
    }
    Ok(())
}
