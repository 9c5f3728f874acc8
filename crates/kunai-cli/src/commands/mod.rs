//! CLI command implementations.
//!
//! This module contains the implementation of each CLI command.

pub mod config;
pub mod hex_utils;
pub mod hexdump;
pub mod read;
pub mod scan;
pub mod track;

use anyhow::{Result, bail};
use kunai::{Engine, LifecycleEvent, MonotonicClock, SystemProcessProvider, TrackerConfig};
use tracing::debug;

/// Build an engine and attach to the target in a single attempt
pub(crate) fn attach_once(config: &TrackerConfig) -> Result<Engine<SystemProcessProvider>> {
    let mut engine = Engine::new(SystemProcessProvider, MonotonicClock::new(), config)?;

    match engine.tick() {
        LifecycleEvent::Attached(info) => {
            debug!("Attached to {} (pid {})", info.name, info.pid);
            println!("Found process (PID: {}, Name: {})", info.pid, info.name);
            Ok(engine)
        }
        LifecycleEvent::NotFound => bail!("{} is not running", config.process_name),
        LifecycleEvent::AttachFailed(reason) => bail!("{}", reason),
        other => bail!("Unexpected lifecycle event: {:?}", other),
    }
}
