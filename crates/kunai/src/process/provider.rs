//! Process discovery and the OS handle abstraction.

use tracing::debug;

use crate::error::{Error, Result};
use crate::process::reader::{MemoryRegion, PointerWidth};

/// Identity of a running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Instruction set of the target image as seen from the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// 32-bit image (native on a 32-bit OS, or under WOW64)
    X86,
    /// Native 64-bit image
    X64,
}

/// An open handle to a target process.
///
/// Dropping the value releases the handle.
pub trait RemoteProcess {
    fn info(&self) -> &ProcessInfo;

    fn architecture(&self) -> Result<Architecture>;

    /// Whether the process has terminated since the handle was opened
    fn has_exited(&self) -> bool;

    /// Address range of the main executable image
    fn main_module(&self) -> Result<MemoryRegion>;

    /// Address range of a loaded module, matched case-insensitively
    fn module(&self, name: &str) -> Result<MemoryRegion>;

    /// Fill `buf` from `address`; partial reads are failures
    fn read_raw(&self, address: u64, buf: &mut [u8]) -> Result<()>;
}

/// Finds and opens processes
pub trait ProcessProvider {
    type Process: RemoteProcess;

    /// Look up a running process by exact name
    fn find_process(&self, name: &str) -> Result<Option<ProcessInfo>>;

    fn open(&self, info: &ProcessInfo) -> Result<Self::Process>;
}

/// Fix the pointer width for a freshly opened process.
///
/// Inspection failures surface as [`Error::AttachmentFailed`], so callers can
/// retry on the same cooldown as a missing process.
pub fn resolve_pointer_width<P: RemoteProcess>(process: &P) -> Result<PointerWidth> {
    let arch = process.architecture().map_err(|e| match e {
        Error::AttachmentFailed(_) => e,
        other => Error::AttachmentFailed(format!(
            "cannot inspect image of pid {}: {}",
            process.info().pid,
            other
        )),
    })?;

    let width = match arch {
        Architecture::X86 => PointerWidth::Bits32,
        Architecture::X64 => PointerWidth::Bits64,
    };
    debug!("pid {} is a {} image", process.info().pid, width);
    Ok(width)
}

/// Compare an executable file name against a process name the way Windows
/// tooling does: case-insensitive, `.exe` suffix optional on either side.
pub fn process_name_matches(exe_name: &str, target: &str) -> bool {
    fn stem(name: &str) -> &str {
        let len = name.len();
        if len > 4 && name.is_char_boundary(len - 4) && name[len - 4..].eq_ignore_ascii_case(".exe")
        {
            &name[..len - 4]
        } else {
            name
        }
    }

    stem(exe_name).eq_ignore_ascii_case(stem(target))
}
