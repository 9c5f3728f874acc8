//! Hex address parsing and formatting utilities.

use anyhow::Result;

/// Parse a hex address string (with or without 0x prefix).
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s
        .trim()
        .strip_prefix("0x")
        .or_else(|| s.trim().strip_prefix("0X"))
        .unwrap_or(s.trim());
    u64::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("Invalid hex address '{}': {}", s, e))
}

/// Format an address as a hex string with 0x prefix.
pub fn format_hex_address(addr: u64) -> String {
    format!("0x{:X}", addr)
}

/// Render bytes as hexdump rows of 16, labelled with absolute addresses.
///
/// ```text
/// 0x00400000: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
/// ```
pub fn format_hexdump(base: u64, bytes: &[u8], ascii: bool) -> Vec<String> {
    let width = format!("{:X}", base.saturating_add(bytes.len() as u64))
        .len()
        .max(8);

    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let address = base.wrapping_add((i * 16) as u64);
            let mut line = format!("0x{:0width$X}: ", address, width = width);

            for j in 0..16 {
                if j == 8 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }

            if ascii {
                line.push_str(" |");
                for byte in chunk {
                    line.push(if (0x20..0x7F).contains(byte) {
                        *byte as char
                    } else {
                        '.'
                    });
                }
                for _ in chunk.len()..16 {
                    line.push(' ');
                }
                line.push('|');
            }

            line.trim_end().to_string()
        })
        .collect()
}
