//! Config command implementation.

use std::path::Path;

use anyhow::Result;
use kunai::TrackerConfig;

/// Print the effective configuration as TOML
pub fn run(config: &TrackerConfig, source: Option<&Path>) -> Result<()> {
    print!("{}", render(config, source)?);
    Ok(())
}

fn render(config: &TrackerConfig, source: Option<&Path>) -> Result<String> {
    let header = match source {
        Some(path) => format!("# Loaded from {}\n", path.display()),
        None => "# Built-in defaults\n".to_string(),
    };
    Ok(format!("{}{}", header, config.to_toml_string()?))
}
