//! Host-facing polling engine.
//!
//! ## Example
//!
//! ```ignore
//! use kunai::prelude::*;
//!
//! let config = TrackerConfig::default();
//! let mut engine = Engine::new(SystemProcessProvider, MonotonicClock::new(), &config)?;
//!
//! loop {
//!     engine.tick();
//!     if let Ok(Some(x)) = engine.try_read_value::<f32>(VELOCITY_X) {
//!         println!("{:.2}", x);
//!     }
//!     std::thread::sleep(config.poll_interval());
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::attach::{AttachState, AttachmentLifecycle, LifecycleEvent, Session};
use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::pointer::PointerChain;
use crate::process::{ProcessProvider, ReadMemory, RemoteValue, ValueKind};
use crate::signature::{Anchor, SignaturePattern, SignatureScanner};

/// A configured value: pointer chain rooted at a named signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedValue {
    pub name: String,
    pub signature: String,
    pub chain: PointerChain,
}

pub struct Engine<P: ProcessProvider, C: Clock = MonotonicClock> {
    lifecycle: AttachmentLifecycle<P, C>,
    scanner: SignatureScanner,
    anchors: HashMap<String, Anchor>,
    values: Vec<TrackedValue>,
}

impl<P: ProcessProvider, C: Clock> Engine<P, C> {
    /// Validate the configuration and compile its signatures.
    ///
    /// Nothing is attached until the first [`tick`](Self::tick).
    pub fn new(provider: P, clock: C, config: &TrackerConfig) -> Result<Self> {
        config.validate()?;

        let anchors = config
            .signatures
            .iter()
            .map(|entry| entry.compile().map(|anchor| (anchor.name.clone(), anchor)))
            .collect::<Result<HashMap<_, _>>>()?;

        let values = config
            .values
            .iter()
            .map(|entry| TrackedValue {
                name: entry.name.clone(),
                signature: entry.signature.clone(),
                chain: PointerChain::new(entry.offsets.clone()),
            })
            .collect();

        let lifecycle = AttachmentLifecycle::new(provider, clock, config.process_name.clone())
            .with_retry(config.retry.build());

        debug!(
            "Engine ready: {} signature(s), {} value(s), target {}",
            anchors.len(),
            config.values.len(),
            config.process_name
        );

        Ok(Self {
            lifecycle,
            scanner: SignatureScanner::new(config.chunk_size),
            anchors,
            values,
        })
    }

    /// Advance the attachment lifecycle; call once per host update before
    /// reading.
    pub fn tick(&mut self) -> LifecycleEvent {
        self.lifecycle.tick()
    }

    pub fn state(&self) -> AttachState {
        self.lifecycle.state()
    }

    pub fn is_attached(&self) -> bool {
        self.state() == AttachState::Attached
    }

    pub fn now(&self) -> Duration {
        self.lifecycle.now()
    }

    pub fn session(&self) -> Option<&Session<P::Process>> {
        self.lifecycle.session()
    }

    pub fn lifecycle(&self) -> &AttachmentLifecycle<P, C> {
        &self.lifecycle
    }

    pub fn values(&self) -> &[TrackedValue] {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<&TrackedValue> {
        self.values.iter().find(|value| value.name == name)
    }

    pub fn anchor(&self, name: &str) -> Option<&Anchor> {
        self.anchors.get(name)
    }

    /// Read a named value.
    ///
    /// Returns `Ok(None)` while detached. While attached, the value's
    /// signature is resolved on first use and cached for the session; the
    /// pointer chain is walked on every call.
    pub fn try_read_value<T: RemoteValue>(&mut self, name: &str) -> Result<Option<T>> {
        let Some(address) = self.resolve_value_address(name)? else {
            return Ok(None);
        };
        match self.lifecycle.session() {
            Some(session) => session.read_value::<T>(address).map(Some),
            None => Ok(None),
        }
    }

    /// Read a named value as `kind`, formatted for display
    pub fn read_value_as(&mut self, name: &str, kind: ValueKind) -> Result<Option<String>> {
        let Some(address) = self.resolve_value_address(name)? else {
            return Ok(None);
        };
        let Some(session) = self.lifecycle.session() else {
            return Ok(None);
        };
        let bytes = session.read_bytes(address, kind.size())?;
        kind.format_bytes(&bytes).map(Some).ok_or_else(|| {
            Error::read_failed(address, format!("cannot decode {} bytes as {}", bytes.len(), kind))
        })
    }

    /// Address at the end of a named value's pointer chain
    pub fn resolve_value_address(&mut self, name: &str) -> Result<Option<u64>> {
        let value = self
            .values
            .iter()
            .find(|value| value.name == name)
            .ok_or_else(|| Error::UnknownValue(name.to_string()))?;
        let anchor = self
            .anchors
            .get(&value.signature)
            .ok_or_else(|| Error::UnknownValue(format!("signature {}", value.signature)))?;

        let Some(session) = self.lifecycle.session_mut() else {
            return Ok(None);
        };
        if session.has_exited() {
            return Err(Error::ProcessExited(session.info().pid));
        }

        let base = session.resolve_anchor(anchor, &self.scanner)?;
        value.chain.resolve(&*session, base).map(Some)
    }

    /// Base address of a named signature, cached for the session
    pub fn resolve_anchor(&mut self, name: &str) -> Result<Option<u64>> {
        let anchor = self
            .anchors
            .get(name)
            .ok_or_else(|| Error::UnknownValue(format!("signature {}", name)))?;
        match self.lifecycle.session_mut() {
            Some(session) => session.resolve_anchor(anchor, &self.scanner).map(Some),
            None => Ok(None),
        }
    }

    /// Scan the main module for an ad hoc pattern without caching the result
    pub fn scan(&self, pattern: &SignaturePattern) -> Result<Option<u64>> {
        match self.lifecycle.session() {
            Some(session) => self
                .scanner
                .scan(session, session.main_module(), pattern)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Raw bytes from the attached process
    pub fn read_bytes(&self, address: u64, size: usize) -> Result<Option<Vec<u8>>> {
        match self.lifecycle.session() {
            Some(session) => session.read_bytes(address, size).map(Some),
            None => Ok(None),
        }
    }

    /// Release the process handle and every cached address.
    ///
    /// The engine stays usable; the next tick may attach again.
    pub fn dispose(&mut self) {
        self.lifecycle.detach();
    }
}

impl<P: ProcessProvider, C: Clock> Drop for Engine<P, C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{VELOCITY_X, VELOCITY_Y};
    use crate::process::{
        MemoryRegion, MockMemoryBuilder, MockMemoryReader, MockProcess, MockProcessProvider,
        PointerWidth,
    };

    const CODE: u64 = 0x40_0000;
    const SLOT: u64 = 0x50_0000;

    fn code() -> Vec<u8> {
        let mut code = vec![0x90; 0x40];
        code.push(0xBA);
        code.extend_from_slice(&(SLOT as u32).to_le_bytes());
        code.extend_from_slice(&[
            0x8B, 0xC0, 0xE8, 0x11, 0x22, 0x33, 0x44, 0x8B, 0x40, 0x0C, 0x89, 0x45, 0xCC,
        ]);
        code.extend_from_slice(&[0x90; 0x40]);
        code
    }

    /// 32-bit image laid out like the game: a `mov edx, imm32` pointing at
    /// the player system, then seven hops down to the velocity pair.
    fn game_memory(x: f32, y: f32) -> MockMemoryReader {
        MockMemoryBuilder::new()
            .pointer_width(PointerWidth::Bits32)
            .write_bytes(CODE, &code())
            .write_pointer(SLOT + 0x24, 0x60_0000)
            .write_pointer(0x60_0000 + 0x4, 0x61_0000)
            .write_pointer(0x61_0000, 0x62_0000)
            .write_pointer(0x62_0000 + 0xC, 0x63_0000)
            .write_pointer(0x63_0000 + 0x10, 0x64_0000)
            .write_pointer(0x64_0000 + 0x30, 0x65_0000)
            .write_f32(0x65_0000 + 0x94, x)
            .write_f32(0x65_0000 + 0x98, y)
            .build()
    }

    fn launch_game(provider: &MockProcessProvider, x: f32, y: f32) {
        let image = MemoryRegion::new(CODE, code().len() as u64);
        provider.launch_process(
            MockProcess::new(4242, "KUNAI.exe", game_memory(x, y)).with_main_module(image),
        );
    }

    fn engine(
        provider: &MockProcessProvider,
        clock: &ManualClock,
    ) -> Engine<MockProcessProvider, ManualClock> {
        Engine::new(provider.clone(), clock.clone(), &TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_reads_builtin_velocity_chain() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        launch_game(&provider, 1.234, -5.678);

        let mut engine = engine(&provider, &clock);
        assert!(engine.tick().is_attached());
        assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), Some(1.23));
        assert_eq!(engine.try_read_value::<f32>(VELOCITY_Y).unwrap(), Some(-5.68));
        assert_eq!(engine.resolve_anchor("player_system").unwrap(), Some(SLOT));
    }

    #[test]
    fn test_detached_read_is_none() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let mut engine = engine(&provider, &clock);

        assert_eq!(engine.tick(), LifecycleEvent::NotFound);
        assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), None);
        assert_eq!(engine.read_bytes(CODE, 4).unwrap(), None);
    }

    #[test]
    fn test_unknown_value_is_an_error() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let mut engine = engine(&provider, &clock);
        assert!(matches!(
            engine.try_read_value::<f32>("velocity_z"),
            Err(Error::UnknownValue(_))
        ));
    }

    #[test]
    fn test_signature_scanned_once_per_session() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        launch_game(&provider, 1.0, 2.0);

        let mut engine = engine(&provider, &clock);
        engine.tick();
        engine.try_read_value::<f32>(VELOCITY_X).unwrap();
        let reads = engine.session().unwrap().process().memory().read_count();

        engine.tick();
        engine.try_read_value::<f32>(VELOCITY_X).unwrap();
        let per_poll = engine.session().unwrap().process().memory().read_count() - reads;

        // Six pointer hops plus the value itself; no scan chunks
        assert_eq!(per_poll, 7);
    }

    #[test]
    fn test_missing_signature_retried_next_read() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch(
            "KUNAI",
            MockMemoryBuilder::new()
                .pointer_width(PointerWidth::Bits32)
                .write_bytes(CODE, &[0x90; 0x100])
                .build(),
        );

        let mut engine = engine(&provider, &clock);
        engine.tick();
        let err = engine.try_read_value::<f32>(VELOCITY_X).unwrap_err();
        assert!(matches!(err, Error::SignatureNotFound(_)));
        assert!(err.is_read_failure());
        assert!(engine.session().unwrap().cached_anchor("player_system").is_none());
        assert!(engine.is_attached());
    }

    #[test]
    fn test_read_value_as_kind() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        launch_game(&provider, 3.14159, 0.0);

        let mut engine = engine(&provider, &clock);
        engine.tick();
        assert_eq!(
            engine.read_value_as(VELOCITY_X, ValueKind::F32).unwrap(),
            Some("3.14".to_string())
        );
        assert_eq!(
            engine.read_value_as(VELOCITY_Y, ValueKind::U32).unwrap(),
            Some("0".to_string())
        );
    }

    #[test]
    fn test_ad_hoc_scan() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        launch_game(&provider, 0.0, 0.0);

        let mut engine = engine(&provider, &clock);
        engine.tick();
        let pattern: SignaturePattern = "8B 40 0C".parse().unwrap();
        assert_eq!(engine.scan(&pattern).unwrap(), Some(CODE + 0x40 + 12));
    }

    #[test]
    fn test_dispose_releases_session() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        launch_game(&provider, 0.0, 0.0);

        let mut engine = engine(&provider, &clock);
        engine.tick();
        engine.try_read_value::<f32>(VELOCITY_X).unwrap();
        engine.dispose();

        assert!(!engine.is_attached());
        assert_eq!(engine.try_read_value::<f32>(VELOCITY_X).unwrap(), None);

        // No cooldown after a voluntary detach
        assert!(matches!(engine.tick(), LifecycleEvent::Attached(_)));
        assert!(engine.session().unwrap().cached_anchor("player_system").is_none());
    }
}
