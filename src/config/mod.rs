// ABOUTME: Application configuration for wsfleet
// Loads the [fleet] and [logging] sections from TOML files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fleet::FleetConfig;

/// Directory name used for local and per-user config
const CONFIG_DIR: &str = ".wsfleet";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Connection fleet settings
    #[serde(default)]
    pub fleet: FleetConfig,

    /// Logging and status reporting
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log output format when writing to stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when RUST_LOG is unset
    pub level: String,

    /// Format for stderr output
    pub format: LogFormat,

    /// Write JSON Lines logs into this directory instead of stderr
    pub directory: Option<PathBuf>,

    /// Seconds between metrics summaries (0 disables)
    pub status_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "wsfleet=info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
            status_interval_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise the first existing file among
    /// `./.wsfleet/config.toml` and `~/.wsfleet/config.toml` is used, falling
    /// back to defaults when neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a single file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        Ok(())
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(CONFIG_DIR).join(CONFIG_FILE));
        }

        // 2. User config (~/.wsfleet/config.toml)
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(CONFIG_DIR).join(CONFIG_FILE));
        }

        paths
    }
}
