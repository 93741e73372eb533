//! mci-ingest - Main entry point

use clap::Parser;
use mci_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use mci_ingest::{Cli, Commands, RunResult};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        })
        .output(LogOutput::Console)
        .log_file_prefix("mci-ingest")
        .build();

    // Environment variables take precedence
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Ignoring invalid logging environment: {}", e);
            log_config
        }
    };

    // Held until exit so file output is flushed
    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let config_path = cli.config.as_deref();

    let code = match &cli.command {
        Commands::Run(args) => match mci_ingest::commands::run::run(config_path, args).await {
            Ok(report) => {
                if let Some(location) = &report.receipt_location {
                    println!("{}", location);
                }
                match report.result {
                    RunResult::Finished => 0,
                    RunResult::Error => 1,
                }
            }
            Err(e) => {
                error!(error = %e, "Ingest could not start");
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::ShowConfig => match mci_ingest::commands::config::show(config_path) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    };

    drop(guard);
    process::exit(code);
}
