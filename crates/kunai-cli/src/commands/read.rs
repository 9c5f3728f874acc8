//! Read command implementation.

use anyhow::{Result, bail};
use kunai::{TrackerConfig, ValueKind};

use super::attach_once;
use super::hex_utils::format_hex_address;

/// Run the read command
pub fn run(config: &TrackerConfig, value: &str, kind: ValueKind) -> Result<()> {
    let Some(entry) = config.value(value) else {
        let known: Vec<&str> = config.values.iter().map(|v| v.name.as_str()).collect();
        bail!("Unknown value '{}' (known: {})", value, known.join(", "));
    };

    let mut engine = attach_once(config)?;
    let Some(address) = engine.resolve_value_address(&entry.name)? else {
        bail!("Process detached while resolving {}", entry.name);
    };
    let Some(text) = engine.read_value_as(&entry.name, kind)? else {
        bail!("Process detached while reading {}", entry.name);
    };

    println!(
        "{} = {} ({} at {})",
        entry.name,
        text,
        kind,
        format_hex_address(address)
    );

    Ok(())
}
