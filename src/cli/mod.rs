// ABOUTME: CLI argument parsing and command routing for wsfleet
//
// Provides command-line interface for:
// - Running the connection fleet until Ctrl-C / SIGTERM (run, default)
// - Printing or saving the effective configuration (config)

pub mod config;
pub mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AppConfig, LogFormat};

/// Keep a fleet of WebSocket connections alive against one endpoint
#[derive(Parser)]
#[command(name = "wsfleet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to load instead of the default search path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the fleet and keep it running (default if no command given)
    Run(RunArgs),

    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

impl Default for Commands {
    fn default() -> Self {
        Self::Run(RunArgs::default())
    }
}

impl Commands {
    /// Overrides carried by the command
    pub fn overrides(&self) -> &RunArgs {
        match self {
            Self::Run(args) => args,
            Self::Config(args) => &args.overrides,
        }
    }
}

/// Fleet overrides applied on top of the loaded config file
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// WebSocket endpoint (ws:// or wss://)
    #[arg(long)]
    pub target: Option<String>,

    /// Number of batches to create
    #[arg(long, short)]
    pub batches: Option<usize>,

    /// Connections per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// HTTP proxy to rotate through (repeatable, host:port or http://host:port)
    #[arg(long = "proxy", conflicts_with = "direct")]
    pub proxies: Vec<String>,

    /// Dial the target directly without a proxy
    #[arg(long)]
    pub direct: bool,

    /// Delay before reconnecting, in milliseconds
    #[arg(long = "reconnect-interval", value_parser = parse_millis)]
    pub reconnect_interval: Option<Duration>,

    /// Failed attempts tolerated before a connection goes dormant
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Keepalive cadence in milliseconds (fractions allowed)
    #[arg(long = "keepalive-interval", value_parser = parse_millis)]
    pub keepalive_interval: Option<Duration>,

    /// Handshake deadline in milliseconds
    #[arg(long = "connect-timeout", value_parser = parse_millis)]
    pub connect_timeout: Option<Duration>,

    /// Keepalive text frame
    #[arg(long)]
    pub payload: Option<String>,

    /// Seconds between metrics summaries (0 disables)
    #[arg(long)]
    pub status_interval: Option<u64>,

    /// Write JSON Lines logs into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Log format for stderr output
    #[arg(long)]
    pub log_format: Option<LogFormat>,
}

impl RunArgs {
    /// Apply every flag that was given; unset flags keep file values
    pub fn apply(&self, config: &mut AppConfig) {
        let fleet = &mut config.fleet;

        if let Some(target) = &self.target {
            fleet.target.clone_from(target);
        }
        if let Some(batches) = self.batches {
            fleet.batch_count = batches;
        }
        if let Some(batch_size) = self.batch_size {
            fleet.batch_size = batch_size;
        }
        if !self.proxies.is_empty() {
            fleet.proxies.clone_from(&self.proxies);
            fleet.direct = false;
        }
        if self.direct {
            fleet.direct = true;
            fleet.proxies.clear();
        }

        let connection = &mut fleet.connection;
        if let Some(interval) = self.reconnect_interval {
            connection.reconnect_interval = interval;
        }
        if let Some(max) = self.max_reconnect_attempts {
            connection.max_reconnect_attempts = max;
        }
        if let Some(interval) = self.keepalive_interval {
            connection.keepalive_interval = interval;
        }
        if let Some(timeout) = self.connect_timeout {
            connection.connect_timeout = timeout;
        }
        if let Some(payload) = &self.payload {
            connection.keepalive_payload.clone_from(payload);
        }

        let logging = &mut config.logging;
        if let Some(secs) = self.status_interval {
            logging.status_interval_secs = secs;
        }
        if let Some(dir) = &self.log_dir {
            logging.directory = Some(dir.clone());
        }
        if let Some(format) = self.log_format {
            logging.format = format;
        }
    }
}

/// Arguments for the config command
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Also write the effective configuration to this file
    #[arg(long)]
    pub save: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RunArgs,
}

/// Parse a non-negative, possibly fractional, number of milliseconds
fn parse_millis(raw: &str) -> Result<Duration, String> {
    let millis: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of milliseconds"))?;

    if !millis.is_finite() || millis < 0.0 {
        return Err(format!("'{raw}' must be a non-negative number of milliseconds"));
    }

    Duration::try_from_secs_f64(millis / 1000.0)
        .map_err(|e| format!("'{raw}' is out of range: {e}"))
}
