// ABOUTME: CLI config command - print the effective configuration

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::config::AppConfig;

/// Print `config` as TOML, optionally saving it to `save`
pub fn execute(config: &AppConfig, save: Option<&Path>) -> Result<()> {
    print!("{}", config.to_toml()?);

    if let Some(path) = save {
        config.save(path)?;
        info!(path = %path.display(), "Saved configuration");
    }

    if let Err(e) = config.fleet.validate() {
        eprintln!("warning: configuration is not runnable: {e}");
    }

    Ok(())
}
