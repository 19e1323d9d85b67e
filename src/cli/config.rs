use anyhow::{Context, Result};
use registry_cache::core::settings::Settings;

/// Prints the effective settings as TOML.
pub fn run(settings: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(settings).context("Failed to render settings")?;
    println!("{rendered}");
    Ok(())
}
