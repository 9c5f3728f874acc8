//! Scan command implementation.

use anyhow::{Context, Result};
use kunai::{Engine, SignaturePattern, SystemProcessProvider, TrackerConfig};
use serde::Serialize;

use super::attach_once;
use super::hex_utils::format_hex_address;

/// What to scan for
pub enum Target {
    /// Every configured signature
    AllSignatures,
    /// One configured signature, by name
    Signature(String),
    /// An ad hoc pattern against the main module
    Pattern {
        pattern: String,
        occurrence: usize,
        offset: i64,
    },
}

#[derive(Debug, Serialize)]
struct ScanResult {
    name: String,
    pattern: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ScanResult {
    fn new(name: &str, pattern: String, outcome: kunai::Result<Option<u64>>) -> Self {
        let (address, error) = match outcome {
            Ok(Some(address)) => (Some(format_hex_address(address)), None),
            Ok(None) => (None, Some("process detached".to_string())),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            pattern,
            address,
            error,
        }
    }

    fn line(&self) -> String {
        match (&self.address, &self.error) {
            (Some(address), _) => format!("{:<20} {}", self.name, address),
            (None, Some(error)) => format!("{:<20} not found ({})", self.name, error),
            (None, None) => format!("{:<20} not found", self.name),
        }
    }
}

/// Run the scan command
pub fn run(config: &TrackerConfig, target: Target, json: bool) -> Result<()> {
    let mut engine = attach_once(config)?;
    let results = scan(&mut engine, config, target)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            println!("{}", result.line());
        }
    }

    Ok(())
}

fn scan(
    engine: &mut Engine<SystemProcessProvider>,
    config: &TrackerConfig,
    target: Target,
) -> Result<Vec<ScanResult>> {
    let results = match target {
        Target::AllSignatures => config
            .signatures
            .iter()
            .map(|entry| {
                ScanResult::new(
                    &entry.name,
                    entry.pattern.clone(),
                    engine.resolve_anchor(&entry.name),
                )
            })
            .collect(),
        Target::Signature(name) => {
            let entry = config
                .signature(&name)
                .with_context(|| format!("No signature named '{}'", name))?;
            vec![ScanResult::new(
                &name,
                entry.pattern.clone(),
                engine.resolve_anchor(&name),
            )]
        }
        Target::Pattern {
            pattern,
            occurrence,
            offset,
        } => {
            let compiled = pattern
                .parse::<SignaturePattern>()
                .with_context(|| format!("Invalid pattern '{}'", pattern))?
                .with_occurrence(occurrence)
                .with_result_offset(offset);
            vec![ScanResult::new(
                "pattern",
                compiled.to_string(),
                engine.scan(&compiled),
            )]
        }
    };

    Ok(results)
}
