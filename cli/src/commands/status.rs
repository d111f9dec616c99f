//! Status command - detect, sweep and print the runtime state.

use anyhow::Result;
use serde_json::json;

pub async fn run(json: bool) -> Result<()> {
    let orchestrator = super::orchestrator().await?;
    let state = orchestrator.detect_now().await;
    let forwards = orchestrator.forwards();
    orchestrator.shutdown().await;

    if json {
        let report = json!({ "state": &*state, "forwards": forwards });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    super::print_state(&state);
    if !forwards.is_empty() {
        println!();
        super::print_forwards(&forwards);
    }
    Ok(())
}
