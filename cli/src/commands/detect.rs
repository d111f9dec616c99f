//! Detect command - report which backend detection selects.

use anyhow::Result;
use runbridge_core::{BackendKind, DeployPrompt};
use serde_json::json;

pub async fn run(json: bool) -> Result<()> {
    let orchestrator = super::orchestrator().await?;
    let state = orchestrator.detect_now().await;
    orchestrator.shutdown().await;

    let details = state.details.clone().unwrap_or_default();
    if json {
        let report = json!({
            "backend": state.backend,
            "endpoint": state.endpoint,
            "pinned": orchestrator.pinned_backend(),
            "details": details,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match state.backend {
        BackendKind::None => {
            println!("No backend available.");
            super::print_prompt(&DeployPrompt::new(orchestrator.settings(), &details));
        }
        backend => {
            println!("Selected backend: {} ({})", backend, state.endpoint);
            if let Some(pinned) = orchestrator.pinned_backend() {
                println!("Pinned: {}", pinned);
            }
            if !details.is_empty() {
                println!("Reason: {}", details);
            }
        }
    }
    Ok(())
}
