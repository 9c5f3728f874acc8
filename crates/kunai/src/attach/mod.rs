//! Attachment lifecycle.
//!
//! The lifecycle owns at most one [`Session`]: an open process handle plus
//! everything derived from it (pointer width, image range, resolved signature
//! anchors). Detaching drops the whole session, so nothing that was resolved
//! against one process instance can leak into the next.
//!
//! Failed attempts are rate limited: after a lookup or open failure no new
//! attempt is made until the retry cooldown (at least one second) has
//! passed. Detecting an exit does not start a cooldown.

use std::collections::HashMap;
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::process::{
    MemoryRegion, PointerWidth, ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess,
    resolve_pointer_width,
};
use crate::retry::{FixedDelay, RetryStrategy, cooldown};
use crate::signature::{Anchor, SignatureScanner};

/// An attached process instance
#[derive(Debug)]
pub struct Session<P> {
    process: P,
    pointer_width: PointerWidth,
    main_module: MemoryRegion,
    anchors: HashMap<String, u64>,
    attached_at: Duration,
}

impl<P: RemoteProcess> Session<P> {
    pub fn new(
        process: P,
        pointer_width: PointerWidth,
        main_module: MemoryRegion,
        attached_at: Duration,
    ) -> Self {
        Self {
            process,
            pointer_width,
            main_module,
            anchors: HashMap::new(),
            attached_at,
        }
    }

    pub fn info(&self) -> &ProcessInfo {
        self.process.info()
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn main_module(&self) -> MemoryRegion {
        self.main_module
    }

    pub fn attached_at(&self) -> Duration {
        self.attached_at
    }

    pub fn has_exited(&self) -> bool {
        self.process.has_exited()
    }

    /// Previously resolved address of a signature, if any
    pub fn cached_anchor(&self, name: &str) -> Option<u64> {
        self.anchors.get(name).copied()
    }

    /// Region an anchor is scanned in
    pub fn region_for(&self, anchor: &Anchor) -> Result<MemoryRegion> {
        match &anchor.module {
            Some(module) => self.process.module(module).map_err(|e| {
                Error::SignatureNotFound(format!("{}: {}", anchor.name, e))
            }),
            None => Ok(self.main_module),
        }
    }

    /// Resolve a signature to its base address, scanning at most once per
    /// session.
    pub fn resolve_anchor(&mut self, anchor: &Anchor, scanner: &SignatureScanner) -> Result<u64> {
        if let Some(address) = self.cached_anchor(&anchor.name) {
            return Ok(address);
        }

        let region = self.region_for(anchor)?;
        let matched = scanner.scan(&*self, region, &anchor.pattern)?;
        let address = if anchor.deref {
            let target = self.read_pointer(matched)?;
            if target == 0 {
                return Err(Error::read_failed(
                    matched,
                    format!("signature {} points at null", anchor.name),
                ));
            }
            target
        } else {
            matched
        };

        info!(
            "Resolved {} to {:#x} in pid {}",
            anchor.name,
            address,
            self.info().pid
        );
        self.anchors.insert(anchor.name.clone(), address);
        Ok(address)
    }
}

impl<P: RemoteProcess> ReadMemory for Session<P> {
    fn read_into(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.process.read_raw(address, buf)
    }

    fn pointer_width(&self) -> PointerWidth {
        self.pointer_width
    }
}

/// Coarse lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum AttachState {
    Detached,
    Attached,
}

/// What a single [`AttachmentLifecycle::tick`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Detached and still inside the retry cooldown; nothing was attempted
    Cooldown,
    /// No process with the target name is running
    NotFound,
    /// The process was found but could not be attached
    AttachFailed(String),
    /// A new session was established
    Attached(ProcessInfo),
    /// The existing session is still alive
    Running,
    /// The attached process terminated and the session was dropped
    Exited(ProcessInfo),
}

impl LifecycleEvent {
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Attached(_) | Self::Running)
    }
}

pub struct AttachmentLifecycle<P: ProcessProvider, C: Clock> {
    provider: P,
    clock: C,
    process_name: String,
    retry: Box<dyn RetryStrategy>,
    failures: u32,
    next_attempt_at: Duration,
    session: Option<Session<P::Process>>,
}

impl<P: ProcessProvider, C: Clock> AttachmentLifecycle<P, C> {
    pub fn new(provider: P, clock: C, process_name: impl Into<String>) -> Self {
        Self {
            provider,
            clock,
            process_name: process_name.into(),
            retry: Box::new(FixedDelay::default()),
            failures: 0,
            next_attempt_at: Duration::ZERO,
            session: None,
        }
    }

    pub fn with_retry(mut self, retry: Box<dyn RetryStrategy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn state(&self) -> AttachState {
        if self.session.is_some() {
            AttachState::Attached
        } else {
            AttachState::Detached
        }
    }

    pub fn session(&self) -> Option<&Session<P::Process>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session<P::Process>> {
        self.session.as_mut()
    }

    /// Consecutive failed attach attempts
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Time until the next attach attempt is allowed, zero when attached
    pub fn remaining_cooldown(&self) -> Duration {
        if self.session.is_some() {
            return Duration::ZERO;
        }
        self.next_attempt_at.saturating_sub(self.clock.now())
    }

    /// Advance the lifecycle by one step.
    ///
    /// When attached, checks whether the process is still alive. When
    /// detached and the cooldown has elapsed, tries to find and open the
    /// target process.
    pub fn tick(&mut self) -> LifecycleEvent {
        let now = self.clock.now();

        if let Some(session) = &self.session {
            if !session.has_exited() {
                return LifecycleEvent::Running;
            }
            let info = session.info().clone();
            self.session = None;
            self.next_attempt_at = now;
            info!("{} (pid {}) exited, detached", info.name, info.pid);
            return LifecycleEvent::Exited(info);
        }

        if now < self.next_attempt_at {
            return LifecycleEvent::Cooldown;
        }

        match self.attach(now) {
            Ok(session) => {
                let info = session.info().clone();
                info!(
                    "Attached to {} (pid {}, {}, image {:#x}..{:#x})",
                    info.name,
                    info.pid,
                    session.pointer_width(),
                    session.main_module().base,
                    session.main_module().end()
                );
                self.failures = 0;
                self.session = Some(session);
                LifecycleEvent::Attached(info)
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                let wait = cooldown(self.retry.as_ref(), self.failures);
                self.next_attempt_at = now + wait;

                match e {
                    Error::ProcessNotFound(_) => {
                        debug!("{} not running, retrying in {:?}", self.process_name, wait);
                        LifecycleEvent::NotFound
                    }
                    other => {
                        if self.failures == 1 {
                            warn!("Attach failed: {}, retrying in {:?}", other, wait);
                        } else {
                            debug!("Attach failed: {}, retrying in {:?}", other, wait);
                        }
                        LifecycleEvent::AttachFailed(other.to_string())
                    }
                }
            }
        }
    }

    /// Drop the current session, if any.
    ///
    /// The next [`tick`](Self::tick) may attach again right away.
    pub fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Detached from pid {}", session.info().pid);
        }
    }

    fn attach(&self, now: Duration) -> Result<Session<P::Process>> {
        let info = self
            .provider
            .find_process(&self.process_name)?
            .ok_or_else(|| Error::ProcessNotFound(self.process_name.clone()))?;
        let process = self.provider.open(&info)?;
        let pointer_width = resolve_pointer_width(&process)?;
        let main_module = process.main_module()?;
        Ok(Session::new(process, pointer_width, main_module, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::process::{MockMemoryBuilder, MockProcess, MockProcessProvider};
    use crate::retry::ExponentialBackoff;

    fn lifecycle(
        provider: &MockProcessProvider,
        clock: &ManualClock,
    ) -> AttachmentLifecycle<MockProcessProvider, ManualClock> {
        AttachmentLifecycle::new(provider.clone(), clock.clone(), "KUNAI")
    }

    fn memory() -> crate::process::MockMemoryReader {
        MockMemoryBuilder::new()
            .pointer_width(PointerWidth::Bits32)
            .write_bytes(0x40_0000, &[0x90; 64])
            .build()
    }

    #[test]
    fn test_attaches_when_process_present() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let pid = provider.launch("KUNAI.exe", memory());

        let mut lifecycle = lifecycle(&provider, &clock);
        match lifecycle.tick() {
            LifecycleEvent::Attached(info) => assert_eq!(info.pid, pid),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(lifecycle.state(), AttachState::Attached);
        let session = lifecycle.session().unwrap();
        assert_eq!(session.pointer_width(), PointerWidth::Bits32);
        assert_eq!(session.main_module().base, 0x40_0000);
        assert_eq!(lifecycle.tick(), LifecycleEvent::Running);
    }

    #[test]
    fn test_cooldown_limits_lookups() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let mut lifecycle = lifecycle(&provider, &clock);

        assert_eq!(lifecycle.tick(), LifecycleEvent::NotFound);
        assert_eq!(provider.lookups(), 1);

        for _ in 0..19 {
            clock.advance(Duration::from_millis(50));
            assert_eq!(lifecycle.tick(), LifecycleEvent::Cooldown);
        }
        assert_eq!(provider.lookups(), 1);
        assert_eq!(lifecycle.remaining_cooldown(), Duration::from_millis(50));

        clock.advance(Duration::from_millis(50));
        assert_eq!(lifecycle.tick(), LifecycleEvent::NotFound);
        assert_eq!(provider.lookups(), 2);
        assert_eq!(lifecycle.failures(), 2);
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let mut lifecycle = lifecycle(&provider, &clock);

        lifecycle.tick();
        clock.advance(Duration::from_millis(999));
        assert_eq!(lifecycle.tick(), LifecycleEvent::Cooldown);
        clock.advance(Duration::from_millis(1));
        assert_eq!(lifecycle.tick(), LifecycleEvent::NotFound);
        assert_eq!(provider.lookups(), 2);
    }

    #[test]
    fn test_open_failure_uses_same_cooldown() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch("KUNAI", memory());
        provider.set_open_failure(true);

        let mut lifecycle = lifecycle(&provider, &clock);
        assert!(matches!(lifecycle.tick(), LifecycleEvent::AttachFailed(_)));
        assert_eq!(lifecycle.state(), AttachState::Detached);

        provider.set_open_failure(false);
        clock.advance(Duration::from_millis(500));
        assert_eq!(lifecycle.tick(), LifecycleEvent::Cooldown);

        clock.advance(Duration::from_millis(500));
        assert!(matches!(lifecycle.tick(), LifecycleEvent::Attached(_)));
        assert_eq!(lifecycle.failures(), 0);
    }

    #[test]
    fn test_uninspectable_image_is_attach_failure() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch_process(MockProcess::new(7, "KUNAI", memory()).with_uninspectable_image());

        let mut lifecycle = lifecycle(&provider, &clock);
        match lifecycle.tick() {
            LifecycleEvent::AttachFailed(message) => {
                assert!(message.contains("cannot inspect image"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(lifecycle.session().is_none());
    }

    #[test]
    fn test_exit_clears_session_and_allows_immediate_retry() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let first = provider.launch("KUNAI", memory());

        let mut lifecycle = lifecycle(&provider, &clock);
        assert!(lifecycle.tick().is_attached());

        provider.exit();
        match lifecycle.tick() {
            LifecycleEvent::Exited(info) => assert_eq!(info.pid, first),
            other => panic!("unexpected {:?}", other),
        }
        assert!(lifecycle.session().is_none());

        let second = provider.launch("KUNAI", memory());
        match lifecycle.tick() {
            LifecycleEvent::Attached(info) => assert_eq!(info.pid, second),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(provider.opens(), 2);
    }

    #[test]
    fn test_retry_strategy_never_below_minimum() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        let mut lifecycle = lifecycle(&provider, &clock).with_retry(Box::new(ExponentialBackoff {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
        }));

        lifecycle.tick();
        assert_eq!(lifecycle.remaining_cooldown(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        lifecycle.tick();
        assert_eq!(lifecycle.remaining_cooldown(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        lifecycle.tick();
        assert_eq!(lifecycle.remaining_cooldown(), Duration::from_secs(2));
        clock.advance(Duration::from_secs(2));
        lifecycle.tick();
        assert_eq!(lifecycle.failures(), 4);
        assert_eq!(lifecycle.remaining_cooldown(), Duration::from_secs(4));
    }

    #[test]
    fn test_anchor_resolved_once_per_session() {
        let memory = MockMemoryBuilder::new()
            .pointer_width(PointerWidth::Bits32)
            .write_bytes(0x40_0000, &[0x00, 0xBA, 0x00, 0x50, 0x40, 0x00, 0x8B, 0xC0])
            .build();
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch("KUNAI", memory);

        let anchor = crate::signature::SignatureEntry {
            name: "player_system".to_string(),
            pattern: "BA ?? ?? ?? ?? 8B C0".to_string(),
            occurrence: 0,
            offset: 1,
            deref: true,
            module: None,
        }
        .compile()
        .unwrap();

        let mut lifecycle = lifecycle(&provider, &clock);
        lifecycle.tick();
        let scanner = SignatureScanner::default();
        let session = lifecycle.session_mut().unwrap();

        // The anchor is the immediate operand of `mov edx, imm32`
        assert_eq!(session.resolve_anchor(&anchor, &scanner).unwrap(), 0x40_5000);
        let reads = session.process().memory().read_count();
        assert_eq!(session.resolve_anchor(&anchor, &scanner).unwrap(), 0x40_5000);
        assert_eq!(session.process().memory().read_count(), reads);
        assert_eq!(session.cached_anchor("player_system"), Some(0x40_5000));
    }

    #[test]
    fn test_module_scoped_anchor_scans_only_that_module() {
        let memory = MockMemoryBuilder::new()
            .pointer_width(PointerWidth::Bits32)
            .write_bytes(0x40_0000, &[0xBA, 0x00, 0x50, 0x40, 0x00, 0x8B, 0xC0, 0x90])
            .write_bytes(0x1000_0000, &[0x90, 0xBA, 0x00, 0x80, 0x00, 0x10, 0x8B, 0xC0])
            .build();
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch_process(
            MockProcess::new(9, "KUNAI", memory)
                .with_main_module(MemoryRegion::new(0x40_0000, 8))
                .with_module("engine.dll", MemoryRegion::new(0x1000_0000, 8)),
        );

        let entry = |module: Option<&str>| {
            crate::signature::SignatureEntry {
                name: module.unwrap_or("main").to_string(),
                pattern: "BA ?? ?? ?? ?? 8B C0".to_string(),
                occurrence: 0,
                offset: 1,
                deref: true,
                module: module.map(str::to_string),
            }
            .compile()
            .unwrap()
        };

        let mut lifecycle = lifecycle(&provider, &clock);
        lifecycle.tick();
        let scanner = SignatureScanner::default();
        let session = lifecycle.session_mut().unwrap();

        let scoped = entry(Some("ENGINE.DLL"));
        assert_eq!(
            session.region_for(&scoped).unwrap(),
            MemoryRegion::new(0x1000_0000, 8)
        );
        assert_eq!(session.resolve_anchor(&scoped, &scanner).unwrap(), 0x1000_8000);
        assert_eq!(session.resolve_anchor(&entry(None), &scanner).unwrap(), 0x40_5000);
    }

    #[test]
    fn test_anchor_in_missing_module_is_not_found() {
        let provider = MockProcessProvider::new();
        let clock = ManualClock::new();
        provider.launch("KUNAI", memory());

        let anchor = crate::signature::SignatureEntry {
            name: "engine".to_string(),
            pattern: "90 90".to_string(),
            occurrence: 0,
            offset: 0,
            deref: false,
            module: Some("engine.dll".to_string()),
        }
        .compile()
        .unwrap();

        let mut lifecycle = lifecycle(&provider, &clock);
        lifecycle.tick();
        let session = lifecycle.session_mut().unwrap();
        let err = session
            .resolve_anchor(&anchor, &SignatureScanner::default())
            .unwrap_err();
        assert!(matches!(err, Error::SignatureNotFound(_)));
    }
}
