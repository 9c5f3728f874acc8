//! OS-backed process access.
//!
//! Windows is the only supported target. Elsewhere the provider reports
//! [`Error::Unsupported`] on every lookup, which the attachment lifecycle
//! treats like any other attach failure.

use crate::error::{Error, Result};
use crate::process::provider::{ProcessInfo, ProcessProvider};

/// Process list and handles of the running OS
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProvider;

#[cfg(target_os = "windows")]
mod imp {
    use std::ffi::c_void;

    use tracing::debug;
    use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE, WAIT_TIMEOUT};
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CREATE_TOOLHELP_SNAPSHOT_FLAGS, CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW,
        Module32NextW, PROCESSENTRY32W, Process32FirstW, Process32NextW, TH32CS_SNAPMODULE,
        TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Threading::{
        GetCurrentProcess, IsWow64Process, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        PROCESS_SYNCHRONIZE, PROCESS_VM_READ, WaitForSingleObject,
    };

    use super::*;
    use crate::process::provider::{Architecture, RemoteProcess, process_name_matches};
    use crate::process::reader::MemoryRegion;

    /// Toolhelp snapshot, closed on drop
    struct Snapshot(HANDLE);

    impl Snapshot {
        fn take(flags: CREATE_TOOLHELP_SNAPSHOT_FLAGS, pid: u32) -> Result<Self> {
            // SAFETY: CreateToolhelp32Snapshot has no pointer arguments.
            let handle = unsafe { CreateToolhelp32Snapshot(flags, pid) }
                .map_err(|e| Error::AttachmentFailed(format!("snapshot failed: {}", e)))?;
            Ok(Self(handle))
        }
    }

    impl Drop for Snapshot {
        fn drop(&mut self) {
            // SAFETY: the handle came from CreateToolhelp32Snapshot and is closed once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    fn wide_to_string(buf: &[u16]) -> String {
        let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
        String::from_utf16_lossy(&buf[..len])
    }

    fn host_is_64bit() -> Result<bool> {
        if cfg!(target_pointer_width = "64") {
            return Ok(true);
        }
        // A 32-bit reader is itself under WOW64 on a 64-bit OS
        let mut wow64 = BOOL::default();
        // SAFETY: GetCurrentProcess returns a pseudo handle; wow64 is a valid out pointer.
        unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64) }
            .map_err(|e| Error::AttachmentFailed(format!("IsWow64Process(self) failed: {}", e)))?;
        Ok(wow64.as_bool())
    }

    /// An open handle to a Windows process, closed on drop
    #[derive(Debug)]
    pub struct SystemProcess {
        handle: HANDLE,
        info: ProcessInfo,
    }

    impl SystemProcess {
        fn modules(&self) -> Result<Vec<(String, MemoryRegion)>> {
            let snapshot =
                Snapshot::take(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.info.pid)?;

            let mut entry = MODULEENTRY32W {
                dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };
            let mut modules = Vec::new();

            // SAFETY: entry is a properly sized MODULEENTRY32W owned by this frame.
            let mut ok = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
            while ok {
                modules.push((
                    wide_to_string(&entry.szModule),
                    MemoryRegion::new(entry.modBaseAddr as u64, u64::from(entry.modBaseSize)),
                ));
                // SAFETY: same entry, same snapshot.
                ok = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
            }

            Ok(modules)
        }
    }

    impl RemoteProcess for SystemProcess {
        fn info(&self) -> &ProcessInfo {
            &self.info
        }

        fn architecture(&self) -> Result<Architecture> {
            let mut wow64 = BOOL::default();
            // SAFETY: handle is open with PROCESS_QUERY_LIMITED_INFORMATION.
            unsafe { IsWow64Process(self.handle, &mut wow64) }.map_err(|e| {
                Error::AttachmentFailed(format!("IsWow64Process({}) failed: {}", self.info.pid, e))
            })?;

            if wow64.as_bool() || !host_is_64bit()? {
                Ok(Architecture::X86)
            } else {
                Ok(Architecture::X64)
            }
        }

        fn has_exited(&self) -> bool {
            // SAFETY: handle is open with PROCESS_SYNCHRONIZE; a zero timeout never blocks.
            unsafe { WaitForSingleObject(self.handle, 0) != WAIT_TIMEOUT }
        }

        fn main_module(&self) -> Result<MemoryRegion> {
            self.modules()?
                .into_iter()
                .next()
                .map(|(_, region)| region)
                .ok_or_else(|| {
                    Error::AttachmentFailed(format!("pid {} has no modules yet", self.info.pid))
                })
        }

        fn module(&self, name: &str) -> Result<MemoryRegion> {
            self.modules()?
                .into_iter()
                .find(|(module, _)| module.eq_ignore_ascii_case(name))
                .map(|(_, region)| region)
                .ok_or_else(|| {
                    Error::AttachmentFailed(format!(
                        "module {} not loaded in pid {}",
                        name, self.info.pid
                    ))
                })
        }

        fn read_raw(&self, address: u64, buf: &mut [u8]) -> Result<()> {
            let mut read = 0usize;
            // SAFETY: buf is a live, writable buffer of buf.len() bytes.
            unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as usize as *const c_void,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len(),
                    Some(&mut read),
                )
            }
            .map_err(|e| Error::read_failed(address, e.to_string()))?;

            if read != buf.len() {
                return Err(Error::read_failed(
                    address,
                    format!("short read: {} of {} bytes", read, buf.len()),
                ));
            }
            Ok(())
        }
    }

    impl Drop for SystemProcess {
        fn drop(&mut self) {
            debug!("Closing handle to pid {}", self.info.pid);
            // SAFETY: the handle came from OpenProcess and is closed once.
            unsafe {
                let _ = CloseHandle(self.handle);
            }
        }
    }

    impl ProcessProvider for SystemProcessProvider {
        type Process = SystemProcess;

        fn find_process(&self, name: &str) -> Result<Option<ProcessInfo>> {
            let snapshot = Snapshot::take(TH32CS_SNAPPROCESS, 0)?;

            let mut entry = PROCESSENTRY32W {
                dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
                ..Default::default()
            };

            // SAFETY: entry is a properly sized PROCESSENTRY32W owned by this frame.
            let mut ok = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
            while ok {
                let exe = wide_to_string(&entry.szExeFile);
                if process_name_matches(&exe, name) {
                    return Ok(Some(ProcessInfo {
                        pid: entry.th32ProcessID,
                        name: exe,
                    }));
                }
                // SAFETY: same entry, same snapshot.
                ok = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
            }

            Ok(None)
        }

        fn open(&self, info: &ProcessInfo) -> Result<SystemProcess> {
            // SAFETY: OpenProcess has no pointer arguments.
            let handle = unsafe {
                OpenProcess(
                    PROCESS_VM_READ | PROCESS_QUERY_LIMITED_INFORMATION | PROCESS_SYNCHRONIZE,
                    false,
                    info.pid,
                )
            }
            .map_err(|e| {
                Error::AttachmentFailed(format!("OpenProcess({}) failed: {}", info.pid, e))
            })?;

            Ok(SystemProcess {
                handle,
                info: info.clone(),
            })
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod imp {
    use super::*;
    use crate::process::provider::{Architecture, RemoteProcess};
    use crate::process::reader::MemoryRegion;

    /// No process can be opened on this platform
    #[derive(Debug)]
    pub enum SystemProcess {}

    impl RemoteProcess for SystemProcess {
        fn info(&self) -> &ProcessInfo {
            match *self {}
        }

        fn architecture(&self) -> Result<Architecture> {
            match *self {}
        }

        fn has_exited(&self) -> bool {
            match *self {}
        }

        fn main_module(&self) -> Result<MemoryRegion> {
            match *self {}
        }

        fn module(&self, _name: &str) -> Result<MemoryRegion> {
            match *self {}
        }

        fn read_raw(&self, _address: u64, _buf: &mut [u8]) -> Result<()> {
            match *self {}
        }
    }

    fn unsupported() -> Error {
        Error::Unsupported("process attachment is only supported on Windows".to_string())
    }

    impl ProcessProvider for SystemProcessProvider {
        type Process = SystemProcess;

        fn find_process(&self, _name: &str) -> Result<Option<ProcessInfo>> {
            Err(unsupported())
        }

        fn open(&self, _info: &ProcessInfo) -> Result<SystemProcess> {
            Err(unsupported())
        }
    }
}

pub use imp::SystemProcess;
