//! Byte signatures with wildcards.
//!
//! The text form is a sequence of hex byte pairs where `??` matches any
//! byte. Both spaced (`"48 8D 0D ?? ?? ?? ??"`) and packed
//! (`"BA????????8BC0"`) forms are accepted; in the spaced form a lone `?`
//! is also a wildcard. Configuration files persist this form.

mod scanner;

use std::fmt;
use std::str::FromStr;

use memchr::memchr_iter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use scanner::{DEFAULT_CHUNK_SIZE, SignatureScanner};

/// A parsed byte pattern plus match selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePattern {
    bytes: Vec<Option<u8>>,
    occurrence: usize,
    result_offset: i64,
}

impl SignaturePattern {
    /// Build from tokens; `None` is a wildcard
    pub fn new(bytes: Vec<Option<u8>>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidSignature("Signature pattern is empty".to_string()));
        }
        Ok(Self {
            bytes,
            occurrence: 0,
            result_offset: 0,
        })
    }

    /// Select the `index`-th match (0-based, ascending address order)
    pub fn with_occurrence(mut self, index: usize) -> Self {
        self.occurrence = index;
        self
    }

    /// Signed offset added to the match address
    pub fn with_result_offset(mut self, offset: i64) -> Self {
        self.result_offset = offset;
        self
    }

    pub fn bytes(&self) -> &[Option<u8>] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn occurrence(&self) -> usize {
        self.occurrence
    }

    pub fn result_offset(&self) -> i64 {
        self.result_offset
    }

    /// Whether the pattern matches `haystack` starting at `pos`
    pub fn matches_at(&self, haystack: &[u8], pos: usize) -> bool {
        let Some(window) = haystack.get(pos..pos + self.bytes.len()) else {
            return false;
        };
        self.bytes
            .iter()
            .zip(window)
            .all(|(expected, actual)| expected.is_none_or(|b| b == *actual))
    }

    /// Start offsets of every match in `haystack`, ascending.
    ///
    /// Overlapping matches are all reported. Candidates are found with
    /// `memchr` on the first literal byte; an all-wildcard pattern matches
    /// at every offset.
    pub fn find_iter<'a>(&'a self, haystack: &'a [u8]) -> Box<dyn Iterator<Item = usize> + 'a> {
        let Some(last) = haystack.len().checked_sub(self.bytes.len()) else {
            return Box::new(std::iter::empty());
        };

        match self.anchor() {
            Some((index, byte)) => Box::new(
                memchr_iter(byte, haystack)
                    .filter_map(move |hit| hit.checked_sub(index))
                    .take_while(move |start| *start <= last)
                    .filter(move |start| self.matches_at(haystack, *start)),
            ),
            None => Box::new(0..=last),
        }
    }

    /// First literal byte and its index within the pattern
    fn anchor(&self) -> Option<(usize, u8)> {
        self.bytes
            .iter()
            .enumerate()
            .find_map(|(i, b)| b.map(|value| (i, value)))
    }
}

impl FromStr for SignaturePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(parse_pattern(s)?)
    }
}

impl fmt::Display for SignaturePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_pattern(&self.bytes))
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "?" {
            bytes.push(None);
            continue;
        }

        if token.len() % 2 != 0 {
            return Err(Error::InvalidSignature(format!(
                "Signature token '{}' has an odd number of digits",
                token
            )));
        }

        for pair in token.as_bytes().chunks(2) {
            if pair == b"??" {
                bytes.push(None);
                continue;
            }

            let text = std::str::from_utf8(pair).map_err(|_| {
                Error::InvalidSignature(format!("Invalid signature token '{}'", token))
            })?;
            let value = u8::from_str_radix(text, 16).map_err(|e| {
                Error::InvalidSignature(format!("Invalid signature token '{}': {}", text, e))
            })?;
            bytes.push(Some(value));
        }
    }

    if bytes.is_empty() {
        return Err(Error::InvalidSignature("Signature pattern is empty".to_string()));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[Option<u8>]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            Some(value) => format!("{:02X}", value),
            None => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A named signature as it appears in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub occurrence: usize,
    #[serde(default)]
    pub offset: i64,
    /// Read one pointer at the offset match instead of using it directly
    #[serde(default)]
    pub deref: bool,
    /// Module to scan; the main executable when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl SignatureEntry {
    pub fn compile(&self) -> Result<Anchor> {
        let pattern = self
            .pattern
            .parse::<SignaturePattern>()
            .map_err(|e| Error::InvalidSignature(format!("{}: {}", self.name, e)))?
            .with_occurrence(self.occurrence)
            .with_result_offset(self.offset);

        Ok(Anchor {
            name: self.name.clone(),
            pattern,
            deref: self.deref,
            module: self.module.clone(),
        })
    }
}

/// A compiled signature that resolves to a base address for pointer chains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub name: String,
    pub pattern: SignaturePattern,
    pub deref: bool,
    pub module: Option<String>,
}

/// Signatures for the current KUNAI build.
///
/// `player_system` matches a `mov edx, imm32` whose immediate is the address
/// of the static slot holding the player system object.
pub fn builtin_signatures() -> Vec<SignatureEntry> {
    vec![SignatureEntry {
        name: "player_system".to_string(),
        pattern: "BA ?? ?? ?? ?? 8B C0 E8 ?? ?? ?? ?? 8B 40 0C 89 45 CC".to_string(),
        occurrence: 0,
        offset: 1,
        deref: true,
        module: None,
    }]
}
