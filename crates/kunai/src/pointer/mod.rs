//! Multi-hop pointer chains.
//!
//! A chain `[o0, o1, .., on]` rooted at `base` reads a pointer at
//! `base + o0`, then at `that + o1`, and so on; the final offset is added
//! without dereferencing and names the value itself. Chains hold no state
//! between calls: intermediate objects move while the process runs, so every
//! read walks the whole path again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::process::{ReadMemory, RemoteValue, offset_address};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointerChain {
    offsets: Vec<i64>,
}

impl PointerChain {
    pub fn new(offsets: Vec<i64>) -> Self {
        Self { offsets }
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    /// Number of pointer dereferences performed by [`resolve`](Self::resolve)
    pub fn depth(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Walk the chain and return the address of the final value.
    ///
    /// A hop that fails to read, or lands on a null pointer, fails the
    /// whole walk.
    pub fn resolve<R: ReadMemory>(&self, reader: &R, base: u64) -> Result<u64> {
        let Some((last, hops)) = self.offsets.split_last() else {
            return Ok(base);
        };

        let mut address = base;
        for (hop, offset) in hops.iter().enumerate() {
            let slot = offset_address(address, *offset)?;
            address = reader.read_pointer(slot)?;
            if address == 0 {
                return Err(Error::read_failed(
                    slot,
                    format!("null pointer at hop {} of {}", hop + 1, hops.len()),
                ));
            }
        }

        offset_address(address, *last)
    }

    /// Resolve the chain and read a `T` at the end of it
    pub fn read<T: RemoteValue, R: ReadMemory>(&self, reader: &R, base: u64) -> Result<T> {
        let address = self.resolve(reader, base)?;
        reader.read_value::<T>(address)
    }
}

impl From<Vec<i64>> for PointerChain {
    fn from(offsets: Vec<i64>) -> Self {
        Self::new(offsets)
    }
}

impl fmt::Display for PointerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .offsets
            .iter()
            .map(|o| {
                if *o < 0 {
                    format!("-{:#X}", o.unsigned_abs())
                } else {
                    format!("{:#X}", o)
                }
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
