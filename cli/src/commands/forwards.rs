//! Forwards command - start the cluster port-forwards and list them.

use anyhow::Result;
use runbridge_core::BackendKind;

pub async fn run(hold: bool, json: bool) -> Result<()> {
    let orchestrator = super::orchestrator().await?;
    let state = orchestrator.detect_now().await;

    if state.backend != BackendKind::Cluster && !json {
        println!(
            "Selected backend is {}; port-forwards are only used with the cluster.",
            state.backend
        );
    }

    let forwards = orchestrator.forwards();
    if json {
        println!("{}", serde_json::to_string_pretty(&forwards)?);
    } else {
        super::print_forwards(&forwards);
    }

    if hold && !forwards.is_empty() {
        if !json {
            println!("\nHolding forwards open (Ctrl-C to stop)...");
        }
        let cancel = super::cancel_on_ctrl_c();
        let worker = orchestrator.clone().spawn();
        cancel.cancelled().await;
        orchestrator.shutdown().await;
        let _ = worker.await;
        return Ok(());
    }

    let stopped = orchestrator.stop_all_forwards().await;
    if stopped > 0 && !json {
        println!("\nStopped {} forward(s). Use --hold to keep them running.", stopped);
    }
    Ok(())
}
