//! Print the effective configuration.

use anyhow::{Context, Result};
use trading_config::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", text);
    Ok(())
}
