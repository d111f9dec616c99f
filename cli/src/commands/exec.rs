//! Exec command - run a command on the selected backend.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Result;
use runbridge_core::{DeployPrompt, Error};
use serde_json::json;

/// Exit code when no backend is usable.
const EXIT_NO_BACKEND: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

pub async fn run(command: Vec<String>, long_running: bool, json: bool) -> Result<ExitCode> {
    let command = command.join(" ");
    let orchestrator = super::orchestrator().await?;
    let cancel = super::cancel_on_ctrl_c();

    let result = orchestrator.exec(&command, &cancel, long_running).await;
    let state = orchestrator.state();
    orchestrator.shutdown().await;

    match result {
        Ok(output) => {
            if json {
                let report = json!({
                    "backend": state.backend,
                    "output": output,
                    "failover": state.failover,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(output.as_bytes())?;
                stdout.flush()?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::NoBackendAvailable) => {
            let details = state.details.clone().unwrap_or_default();
            let prompt = DeployPrompt::new(orchestrator.settings(), &details);
            if json {
                println!("{}", serde_json::to_string_pretty(&json!({ "error": prompt }))?);
            } else {
                super::print_prompt(&prompt);
            }
            Ok(ExitCode::from(EXIT_NO_BACKEND))
        }
        Err(Error::Cancelled) => {
            eprintln!("Cancelled.");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
        Err(e) => {
            if json {
                let report = json!({
                    "error": e.to_string(),
                    "output": e.partial_output(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if let Some(output) = e.partial_output() {
                    print!("{}", output);
                }
                eprintln!("Error: {}", e);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
