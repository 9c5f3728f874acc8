//! In-memory stand-ins for a target process.
//!
//! `MockMemoryReader` is a sparse address space: bytes written through the
//! builder are mapped, everything else is unmapped and fails to read, the
//! same way an invalid page does in a real process. `MockProcessProvider`
//! plays the OS process list and lets tests launch, kill and relaunch.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::process::provider::{
    Architecture, ProcessInfo, ProcessProvider, RemoteProcess, process_name_matches,
};
use crate::process::reader::{MemoryRegion, PointerWidth, ReadMemory};

/// Builder for [`MockMemoryReader`]
#[derive(Debug, Clone)]
pub struct MockMemoryBuilder {
    regions: Vec<(u64, Vec<u8>)>,
    width: PointerWidth,
}

impl Default for MockMemoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
            width: PointerWidth::Bits64,
        }
    }

    /// Set the pointer width. Affects `write_pointer` calls made afterwards.
    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.width = width;
        self
    }

    /// Map `data` at `address`. Later writes win where they overlap earlier
    /// ones; touching regions are merged.
    pub fn write_bytes(mut self, address: u64, data: &[u8]) -> Self {
        if data.is_empty() {
            return self;
        }
        let end = address + data.len() as u64;

        let (touching, mut rest): (Vec<_>, Vec<_>) = self
            .regions
            .into_iter()
            .partition(|(base, bytes)| *base <= end && base + bytes.len() as u64 >= address);

        let start = touching.iter().map(|(base, _)| *base).fold(address, u64::min);
        let stop = touching
            .iter()
            .map(|(base, bytes)| base + bytes.len() as u64)
            .fold(end, u64::max);

        let mut merged = vec![0u8; (stop - start) as usize];
        for (base, bytes) in &touching {
            let at = (base - start) as usize;
            merged[at..at + bytes.len()].copy_from_slice(bytes);
        }
        let at = (address - start) as usize;
        merged[at..at + data.len()].copy_from_slice(data);

        rest.push((start, merged));
        rest.sort_by_key(|(base, _)| *base);
        self.regions = rest;
        self
    }

    /// Map `size` zero bytes at `address`
    pub fn zeroed(self, address: u64, size: usize) -> Self {
        self.write_bytes(address, &vec![0u8; size])
    }

    pub fn write_u32(self, address: u64, value: u32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_i32(self, address: u64, value: i32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_u64(self, address: u64, value: u64) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn write_f32(self, address: u64, value: f32) -> Self {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a pointer using the current pointer width
    pub fn write_pointer(self, address: u64, value: u64) -> Self {
        match self.width {
            PointerWidth::Bits32 => self.write_u32(address, value as u32),
            PointerWidth::Bits64 => self.write_u64(address, value),
        }
    }

    pub fn build(self) -> MockMemoryReader {
        MockMemoryReader {
            regions: Arc::new(self.regions),
            width: self.width,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Sparse in-memory address space implementing [`ReadMemory`].
///
/// Clones share the same contents and read counter.
#[derive(Debug, Clone)]
pub struct MockMemoryReader {
    regions: Arc<Vec<(u64, Vec<u8>)>>,
    width: PointerWidth,
    reads: Arc<AtomicUsize>,
}

impl MockMemoryReader {
    /// Number of `read_into` calls, successful or not
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Smallest region covering every mapped byte
    pub fn extent(&self) -> MemoryRegion {
        match (self.regions.first(), self.regions.last()) {
            (Some((first, _)), Some((last, data))) => {
                MemoryRegion::new(*first, last + data.len() as u64 - first)
            }
            _ => MemoryRegion::new(0, 0),
        }
    }
}

impl ReadMemory for MockMemoryReader {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let region = self
            .regions
            .iter()
            .find(|(base, data)| address >= *base && address < *base + data.len() as u64);

        let Some((base, data)) = region else {
            return Err(Error::read_failed(address, "unmapped"));
        };

        let start = (address - base) as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(Error::read_failed(address, "read crosses into unmapped memory"));
        }

        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn pointer_width(&self) -> PointerWidth {
        self.width
    }
}

/// A fake process backed by a [`MockMemoryReader`]
#[derive(Debug, Clone)]
pub struct MockProcess {
    info: ProcessInfo,
    memory: MockMemoryReader,
    architecture: Option<Architecture>,
    main_module: MemoryRegion,
    modules: Vec<(String, MemoryRegion)>,
    exited: Arc<AtomicBool>,
    faulted: Arc<AtomicBool>,
}

impl MockProcess {
    /// The architecture follows the memory's pointer width and the main
    /// module spans every mapped byte.
    pub fn new(pid: u32, name: &str, memory: MockMemoryReader) -> Self {
        let architecture = match memory.pointer_width() {
            PointerWidth::Bits32 => Architecture::X86,
            PointerWidth::Bits64 => Architecture::X64,
        };
        let main_module = memory.extent();
        Self {
            info: ProcessInfo {
                pid,
                name: name.to_string(),
            },
            memory,
            architecture: Some(architecture),
            main_module,
            modules: Vec::new(),
            exited: Arc::new(AtomicBool::new(false)),
            faulted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = Some(architecture);
        self
    }

    /// Make `architecture()` fail, as when the image header is unreadable
    pub fn with_uninspectable_image(mut self) -> Self {
        self.architecture = None;
        self
    }

    pub fn with_main_module(mut self, region: MemoryRegion) -> Self {
        self.main_module = region;
        self
    }

    pub fn with_module(mut self, name: &str, region: MemoryRegion) -> Self {
        self.modules.push((name.to_string(), region));
        self
    }

    pub fn memory(&self) -> &MockMemoryReader {
        &self.memory
    }

    pub fn kill(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    /// Make every read fail while the process keeps running
    pub fn set_faulted(&self, faulted: bool) {
        self.faulted.store(faulted, Ordering::SeqCst);
    }
}

impl RemoteProcess for MockProcess {
    fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn architecture(&self) -> Result<Architecture> {
        self.architecture
            .ok_or_else(|| Error::Unsupported("image header unreadable".to_string()))
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn main_module(&self) -> Result<MemoryRegion> {
        Ok(self.main_module)
    }

    fn module(&self, name: &str) -> Result<MemoryRegion> {
        self.modules
            .iter()
            .find(|(module, _)| module.eq_ignore_ascii_case(name))
            .map(|(_, region)| *region)
            .ok_or_else(|| Error::AttachmentFailed(format!("module {} not loaded", name)))
    }

    fn read_raw(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        if self.has_exited() {
            return Err(Error::read_failed(address, "process has exited"));
        }
        if self.faulted.load(Ordering::SeqCst) {
            return Err(Error::read_failed(address, "access violation"));
        }
        self.memory.read_into(address, buf)
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    running: Option<MockProcess>,
    fail_open: bool,
}

/// Fake OS process list.
///
/// Clones share state, so a test can keep one handle while an engine owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct MockProcessProvider {
    state: Arc<Mutex<ProviderState>>,
    lookups: Arc<AtomicUsize>,
    opens: Arc<AtomicUsize>,
    next_pid: Arc<AtomicU32>,
}

impl MockProcessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a process; a previously running instance is killed first.
    /// Returns the new pid.
    pub fn launch(&self, name: &str, memory: MockMemoryReader) -> u32 {
        let pid = 1000 + self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.launch_process(MockProcess::new(pid, name, memory));
        pid
    }

    /// Start a preconfigured process
    pub fn launch_process(&self, process: MockProcess) {
        let mut state = self.lock();
        if let Some(previous) = state.running.take() {
            previous.kill();
        }
        state.running = Some(process);
    }

    /// Terminate the running process, if any
    pub fn exit(&self) {
        if let Some(process) = self.lock().running.take() {
            process.kill();
        }
    }

    /// Make subsequent `open` calls fail
    pub fn set_open_failure(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Number of process list lookups performed
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of successful handle opens
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProcessProvider for MockProcessProvider {
    type Process = MockProcess;

    fn find_process(&self, name: &str) -> Result<Option<ProcessInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .lock()
            .running
            .as_ref()
            .filter(|process| process_name_matches(&process.info.name, name))
            .map(|process| process.info.clone()))
    }

    fn open(&self, info: &ProcessInfo) -> Result<MockProcess> {
        let state = self.lock();
        if state.fail_open {
            return Err(Error::AttachmentFailed(format!(
                "access denied opening pid {}",
                info.pid
            )));
        }

        let process = state
            .running
            .as_ref()
            .filter(|process| process.info.pid == info.pid)
            .cloned()
            .ok_or_else(|| Error::AttachmentFailed(format!("pid {} is gone", info.pid)))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(process)
    }
}
