//! Tracker configuration.
//!
//! Stored as TOML. Every field has a default, so an empty file (or none at
//! all) gives a working setup for the current KUNAI build:
//!
//! ```toml
//! process_name = "KUNAI"
//! poll_interval_ms = 50
//!
//! [retry]
//! strategy = "fixed"
//! delay_ms = 1000
//!
//! [[signatures]]
//! name = "player_system"
//! pattern = "BA ?? ?? ?? ?? 8B C0 E8 ?? ?? ?? ?? 8B 40 0C 89 45 CC"
//! offset = 1
//! deref = true
//!
//! [[values]]
//! name = "velocity_x"
//! signature = "player_system"
//! offsets = [0x24, 0x4, 0x0, 0xC, 0x10, 0x30, 0x94]
//! ```
//!
//! TOML hex literals cannot carry a sign, so negative offsets are written in
//! decimal (`offsets = [0x24, -8]`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::signature::{DEFAULT_CHUNK_SIZE, SignatureEntry, builtin_signatures};

pub const DEFAULT_PROCESS_NAME: &str = "KUNAI";
pub const PLAYER_SYSTEM: &str = "player_system";
pub const VELOCITY_X: &str = "velocity_x";
pub const VELOCITY_Y: &str = "velocity_y";

/// Smallest accepted scan chunk
const MIN_CHUNK_SIZE: usize = 256;

/// A named pointer chain rooted at a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub name: String,
    pub signature: String,
    pub offsets: Vec<i64>,
}

/// Pointer chains for the player's velocity components
pub fn builtin_values() -> Vec<ValueEntry> {
    let chain = |last: i64| vec![0x24, 0x4, 0x0, 0xC, 0x10, 0x30, last];
    vec![
        ValueEntry {
            name: VELOCITY_X.to_string(),
            signature: PLAYER_SYSTEM.to_string(),
            offsets: chain(0x94),
        },
        ValueEntry {
            name: VELOCITY_Y.to_string(),
            signature: PLAYER_SYSTEM.to_string(),
            offsets: chain(0x98),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Target process name, with or without `.exe`
    pub process_name: String,
    /// Host update cadence
    pub poll_interval_ms: u64,
    /// Length of the trailing average window
    pub window_ms: u64,
    /// Bytes per read while scanning for signatures
    pub chunk_size: usize,
    pub retry: RetryConfig,
    pub signatures: Vec<SignatureEntry>,
    pub values: Vec<ValueEntry>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            poll_interval_ms: 50,
            window_ms: 1000,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryConfig::default(),
            signatures: builtin_signatures(),
            values: builtin_values(),
        }
    }
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn signature(&self, name: &str) -> Option<&SignatureEntry> {
        self.signatures.iter().find(|entry| entry.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&ValueEntry> {
        self.values.iter().find(|entry| entry.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.process_name.trim().is_empty() {
            return Err(invalid("process_name is empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be positive"));
        }
        if self.window_ms == 0 {
            return Err(invalid("window_ms must be positive"));
        }
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(invalid(format!(
                "chunk_size must be at least {} bytes",
                MIN_CHUNK_SIZE
            )));
        }

        let mut names = HashSet::new();
        for entry in &self.signatures {
            if !names.insert(entry.name.as_str()) {
                return Err(invalid(format!("duplicate signature '{}'", entry.name)));
            }
            entry.compile()?;
        }

        let mut value_names = HashSet::new();
        for value in &self.values {
            if !value_names.insert(value.name.as_str()) {
                return Err(invalid(format!("duplicate value '{}'", value.name)));
            }
            if !names.contains(value.signature.as_str()) {
                return Err(invalid(format!(
                    "value '{}' refers to unknown signature '{}'",
                    value.name, value.signature
                )));
            }
            if value.offsets.is_empty() {
                return Err(invalid(format!("value '{}' has no offsets", value.name)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfig(message.into())
}

/// Builder for [`TrackerConfig`]
#[derive(Debug, Clone, Default)]
pub struct TrackerConfigBuilder {
    process_name: Option<String>,
    poll_interval_ms: Option<u64>,
    window_ms: Option<u64>,
    chunk_size: Option<usize>,
    retry: Option<RetryConfig>,
    signatures: Option<Vec<SignatureEntry>>,
    values: Option<Vec<ValueEntry>>,
}

impl TrackerConfigBuilder {
    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.window_ms = Some(window.as_millis() as u64);
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Replace the signature list
    pub fn signatures(mut self, signatures: Vec<SignatureEntry>) -> Self {
        self.signatures = Some(signatures);
        self
    }

    /// Replace the value list
    pub fn values(mut self, values: Vec<ValueEntry>) -> Self {
        self.values = Some(values);
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<TrackerConfig> {
        let default = TrackerConfig::default();
        let config = TrackerConfig {
            process_name: self.process_name.unwrap_or(default.process_name),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(default.poll_interval_ms),
            window_ms: self.window_ms.unwrap_or(default.window_ms),
            chunk_size: self.chunk_size.unwrap_or(default.chunk_size),
            retry: self.retry.unwrap_or(default.retry),
            signatures: self.signatures.unwrap_or(default.signatures),
            values: self.values.unwrap_or(default.values),
        };
        config.validate()?;
        Ok(config)
    }
}
