//! Chunked signature scanning over remote memory.

use std::ops::ControlFlow;

use tracing::debug;

use crate::error::{Error, Result};
use crate::process::{MemoryRegion, ReadMemory, offset_address};
use crate::signature::SignaturePattern;

/// Bytes fetched per read call while scanning
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Scans a memory region for a [`SignaturePattern`].
///
/// The region is read in chunks; the last `len - 1` bytes of each chunk are
/// carried into the next one so matches straddling a chunk boundary are
/// found exactly once. Chunks that fail to read (guard pages, gaps between
/// sections) are skipped and break the carry.
#[derive(Debug, Clone, Copy)]
pub struct SignatureScanner {
    chunk_size: usize,
}

impl Default for SignatureScanner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl SignatureScanner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Resolve `pattern` inside `region`.
    ///
    /// Returns the address of the selected occurrence plus the pattern's
    /// result offset, or [`Error::SignatureNotFound`] when the region holds
    /// fewer matches than the occurrence index requires.
    pub fn scan<R: ReadMemory>(
        &self,
        reader: &R,
        region: MemoryRegion,
        pattern: &SignaturePattern,
    ) -> Result<u64> {
        let matched = self
            .find_nth(reader, region, pattern)
            .ok_or_else(|| {
                Error::SignatureNotFound(format!(
                    "{} (occurrence {}) in {:#x}..{:#x}",
                    pattern,
                    pattern.occurrence(),
                    region.base,
                    region.end()
                ))
            })?;

        offset_address(matched, pattern.result_offset())
    }

    /// Address of the match selected by the pattern's occurrence index
    pub fn find_nth<R: ReadMemory>(
        &self,
        reader: &R,
        region: MemoryRegion,
        pattern: &SignaturePattern,
    ) -> Option<u64> {
        let target = pattern.occurrence();
        let mut seen = 0usize;
        let mut found = None;

        let skipped = self.walk(reader, region, pattern, |address| {
            if seen == target {
                found = Some(address);
                return ControlFlow::Break(());
            }
            seen += 1;
            ControlFlow::Continue(())
        });

        match found {
            Some(address) => debug!(
                "Signature {} matched at {:#x} (occurrence {})",
                pattern, address, target
            ),
            None => debug!(
                "Signature {} not found: {} matches, wanted occurrence {} ({} chunks unreadable)",
                pattern, seen, target, skipped
            ),
        }
        found
    }

    /// Every match start in `region`, ascending
    pub fn find_all<R: ReadMemory>(
        &self,
        reader: &R,
        region: MemoryRegion,
        pattern: &SignaturePattern,
    ) -> Vec<u64> {
        let mut results = Vec::new();
        self.walk(reader, region, pattern, |address| {
            results.push(address);
            ControlFlow::Continue(())
        });
        results
    }

    /// Feed every match start to `on_match` in ascending order until it
    /// breaks. Returns the number of chunks that could not be read.
    fn walk<R, F>(
        &self,
        reader: &R,
        region: MemoryRegion,
        pattern: &SignaturePattern,
        mut on_match: F,
    ) -> usize
    where
        R: ReadMemory,
        F: FnMut(u64) -> ControlFlow<()>,
    {
        let keep = pattern.len() - 1;
        let mut tail: Vec<u8> = Vec::new();
        let mut offset: u64 = 0;
        let mut skipped = 0usize;

        while offset < region.size {
            let read_size = (region.size - offset).min(self.chunk_size as u64) as usize;
            let addr = region.base + offset;
            offset += read_size as u64;

            let chunk = match reader.read_bytes(addr, read_size) {
                Ok(bytes) => bytes,
                Err(e) => {
                    skipped += 1;
                    debug!("Skipping unreadable chunk at {:#x}: {}", addr, e);
                    tail.clear();
                    continue;
                }
            };

            let mut data = Vec::with_capacity(tail.len() + chunk.len());
            data.extend_from_slice(&tail);
            data.extend_from_slice(&chunk);
            let data_base = addr - tail.len() as u64;

            for pos in pattern.find_iter(&data) {
                if on_match(data_base + pos as u64).is_break() {
                    return skipped;
                }
            }

            tail = if data.len() > keep {
                data[data.len() - keep..].to_vec()
            } else {
                data
            };
        }

        skipped
    }
}
