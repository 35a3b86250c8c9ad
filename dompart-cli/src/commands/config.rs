//! Config command implementation - print or write configuration files

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, example: bool, output: Option<PathBuf>) -> Result<()> {
    let content = if example {
        Config::example_toml()?
    } else {
        toml::to_string_pretty(config).context("Failed to serialize configuration")?
    };

    match output {
        Some(path) => {
            std::fs::write(&path, content)
                .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;
            log::info!("Configuration written to: {}", path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}
