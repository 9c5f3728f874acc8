//! # kunai
//!
//! Live memory introspection for the KUNAI game process.
//!
//! This crate provides:
//! - Process discovery and attachment with a rate-limited retry cooldown
//! - Signature scanning with wildcard bytes over a process image
//! - Pointer chain resolution with the target's pointer width
//! - Typed reads of primitive values (floats rounded to two decimals)
//! - A trailing one-second average of the player's velocity
//!
//! Memory access goes through the [`process::ReadMemory`] and
//! [`process::ProcessProvider`] traits; `process::mock` provides an
//! in-memory backend for tests.

pub mod attach;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod pointer;
pub mod prelude;
pub mod process;
pub mod retry;
pub mod signature;
pub mod speed;

pub use attach::{AttachState, AttachmentLifecycle, LifecycleEvent, Session};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    DEFAULT_PROCESS_NAME, PLAYER_SYSTEM, TrackerConfig, TrackerConfigBuilder, VELOCITY_X,
    VELOCITY_Y, ValueEntry, builtin_values,
};
pub use engine::{Engine, TrackedValue};
pub use error::{Error, Result};
pub use pointer::PointerChain;
pub use process::{
    Architecture, MemoryRegion, PointerWidth, ProcessInfo, ProcessProvider, ReadMemory,
    RemoteProcess, RemoteValue, SystemProcess, SystemProcessProvider, ValueKind,
};
pub use retry::{ExponentialBackoff, FixedDelay, RetryConfig, RetryStrategy};
pub use signature::{
    Anchor, SignatureEntry, SignaturePattern, SignatureScanner, builtin_signatures,
    format_pattern, parse_pattern,
};
pub use speed::{
    Sample, SpeedDisplay, SpeedTracker, SpeedUpdate, Vec2, WindowSummary, WindowedAverage,
};
