//! RunBridge CLI - Run commands on whichever runtime backend is up
//!
//! A command-line tool for detecting the usable backend (cluster or
//! container), watching its health, managing port-forwards and
//! dispatching commands.

mod commands;
mod logging;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use runbridge_core::BackendKind;

use logging::LogLevel;

#[derive(Parser)]
#[command(name = "runbridge")]
#[command(author, version, about = "Run commands on the usable runtime backend")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Log level (overrides RUNBRIDGE_LOG)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the backend, sweep service health and print the runtime state
    #[command(alias = "st")]
    Status,

    /// Run backend detection and report the choice
    Detect,

    /// Run a command on the selected backend
    Exec {
        /// Allow up to 300s instead of 90s
        #[arg(long)]
        long: bool,

        /// Command line to run (passed to `sh -c`)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Keep detecting and sweeping, printing changes until Ctrl-C
    Watch,

    /// Start cluster port-forwards and list them
    #[command(alias = "fw")]
    Forwards {
        /// Keep the forwards running until Ctrl-C
        #[arg(long)]
        hold: bool,
    },

    /// Prefer a backend during detection
    Pin {
        /// cluster or container
        backend: BackendKind,
    },

    /// Clear the backend preference
    Unpin,

    /// Show current configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings (file plus environment overrides)
    Show,
    /// Print the configuration file path
    Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);

    match cli.command {
        Commands::Status => commands::status::run(cli.json).await?,
        Commands::Detect => commands::detect::run(cli.json).await?,
        Commands::Exec { long, command } => {
            return commands::exec::run(command, long, cli.json).await;
        }
        Commands::Watch => commands::watch::run(cli.json).await?,
        Commands::Forwards { hold } => commands::forwards::run(hold, cli.json).await?,
        Commands::Pin { backend } => commands::pin::pin(backend, cli.json).await?,
        Commands::Unpin => commands::pin::unpin(cli.json).await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => commands::config::show(cli.json).await?,
            ConfigAction::Path => commands::config::path()?,
        },
    }

    Ok(ExitCode::SUCCESS)
}
