use std::fmt;

use crate::error::{Error, Result};
use crate::process::value::RemoteValue;

/// Byte width of a pointer in the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Zero-extend a little-endian pointer of this width
    pub fn decode(self, bytes: &[u8]) -> Option<u64> {
        match self {
            Self::Bits32 => u32::from_le_slice(bytes).map(u64::from),
            Self::Bits64 => u64::from_le_slice(bytes),
        }
    }
}

impl fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits32 => write!(f, "32-bit"),
            Self::Bits64 => write!(f, "64-bit"),
        }
    }
}

/// A contiguous address range in the target process (usually a module image)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
}

impl MemoryRegion {
    pub fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Readable remote memory.
///
/// Implementors provide raw reads and the pointer width of the target; the
/// typed and pointer-sized helpers are derived from those two.
pub trait ReadMemory {
    /// Fill `buf` from `address`. Partial reads are failures.
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()>;

    fn pointer_width(&self) -> PointerWidth;

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        self.read_into(address, &mut buffer)?;
        Ok(buffer)
    }

    /// Read a pointer-sized value, zero-extended to `u64`
    fn read_pointer(&self, address: u64) -> Result<u64> {
        let width = self.pointer_width();
        let bytes = self.read_bytes(address, width.bytes())?;
        width
            .decode(&bytes)
            .ok_or_else(|| Error::read_failed(address, "short pointer read"))
    }

    /// Read a value and apply its normalization (floats are rounded)
    fn read_value<T: RemoteValue>(&self, address: u64) -> Result<T>
    where
        Self: Sized,
    {
        let bytes = self.read_bytes(address, T::SIZE)?;
        T::from_le_slice(&bytes)
            .map(RemoteValue::normalize)
            .ok_or_else(|| Error::read_failed(address, "short value read"))
    }
}

impl<R: ReadMemory + ?Sized> ReadMemory for &R {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_into(address, buf)
    }

    fn pointer_width(&self) -> PointerWidth {
        (**self).pointer_width()
    }
}

/// Apply a signed byte offset to an address, rejecting wrap-around
pub fn offset_address(address: u64, offset: i64) -> Result<u64> {
    address.checked_add_signed(offset).ok_or_else(|| {
        Error::InvalidOffset(format!(
            "offset {:#x} from {:#x} leaves the address space",
            offset, address
        ))
    })
}
