//! Prelude module for convenient imports
//!
//! ```ignore
//! use kunai::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Engine types: `Engine`, `SpeedTracker`, `TrackerConfig`
//! - Process access: `SystemProcessProvider`, `ReadMemory`, `RemoteValue`
//! - Time: `Clock`, `MonotonicClock`
//! - Error handling: `Error`, `Result`

// Engine and host-facing types
pub use crate::attach::LifecycleEvent;
pub use crate::engine::Engine;
pub use crate::speed::{SpeedDisplay, SpeedTracker, SpeedUpdate, Vec2};

// Configuration
pub use crate::config::{TrackerConfig, VELOCITY_X, VELOCITY_Y};

// Process access
pub use crate::process::{ProcessProvider, ReadMemory, RemoteValue, SystemProcessProvider};

// Time
pub use crate::clock::{Clock, MonotonicClock};

// Error handling
pub use crate::error::{Error, Result};
