//! Hexdump command implementation.
//!
//! Displays raw memory bytes in traditional hexdump format, useful for
//! checking where a pointer chain lands.

use anyhow::{Result, bail};
use kunai::TrackerConfig;

use super::attach_once;
use super::hex_utils::{format_hex_address, format_hexdump};

/// Where to start dumping
pub enum Target {
    Address(u64),
    /// End of a configured value's pointer chain
    Value(String),
}

/// Run the hexdump command
pub fn run(config: &TrackerConfig, target: Target, size: usize, ascii: bool) -> Result<()> {
    if size == 0 {
        bail!("Size must be positive");
    }

    let mut engine = attach_once(config)?;
    let address = match target {
        Target::Address(address) => address,
        Target::Value(name) => match engine.resolve_value_address(&name)? {
            Some(address) => address,
            None => bail!("Process detached while resolving {}", name),
        },
    };

    check_range(address, size)?;
    let Some(bytes) = engine.read_bytes(address, size)? else {
        bail!("Process detached while reading");
    };

    println!("Hexdump at {} ({} bytes):", format_hex_address(address), size);
    println!();
    for line in format_hexdump(address, &bytes, ascii) {
        println!("{}", line);
    }

    Ok(())
}

/// Reject dumps that run past the end of the address space
fn check_range(address: u64, size: usize) -> Result<()> {
    if address.checked_add(size as u64).is_none() {
        bail!(
            "{} bytes at {} run past the end of the address space",
            size,
            format_hex_address(address)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range(0x40_0000, 256).is_ok());
        assert!(check_range(u64::MAX - 16, 16).is_ok());
        assert!(check_range(u64::MAX - 16, 17).is_err());
        assert!(check_range(u64::MAX, 1).is_err());
    }
}
