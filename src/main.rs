// ABOUTME: Main entry point for wsfleet
//
// Binary: wsfleet
// Usage: wsfleet [--config FILE] [COMMAND]
// - No command / run: create the fleet and keep it alive until Ctrl-C or SIGTERM
// - config: print the effective configuration as TOML

#![allow(missing_docs)]

use anyhow::{Context, Result};
use clap::Parser;

use wsfleet::cli::{self, Cli, Commands};
use wsfleet::config::{AppConfig, LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let command = args.command.unwrap_or_default();

    let mut config = AppConfig::load(args.config.as_deref())?;
    command.overrides().apply(&mut config);

    setup_logging(&config.logging)?;
    setup_panic_handler();

    match command {
        Commands::Run(_) => cli::run::execute(config).await,
        Commands::Config(config_args) => cli::config::execute(&config, config_args.save.as_deref()),
    }
}

fn setup_logging(logging: &LoggingConfig) -> Result<()> {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log filter '{}'", logging.level))?;

    if let Some(log_dir) = &logging.directory {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        // JSONL log file with timestamp
        let log_file = log_dir.join(format!(
            "wsfleet-{}.jsonl",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to create log file {}", log_file.display()))?;

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(file)
                    .with_ansi(false),
            )
            .with(filter)
            .try_init()
            .context("Failed to initialise logging")?;

        return Ok(());
    }

    let initialised = match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    initialised.context("Failed to initialise logging")
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
    }));
}
