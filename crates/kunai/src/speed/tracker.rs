use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::attach::LifecycleEvent;
use crate::clock::{Clock, MonotonicClock};
use crate::config::{TrackerConfig, VELOCITY_X, VELOCITY_Y};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::process::ProcessProvider;
use crate::speed::{Sample, Vec2, WindowSummary, WindowedAverage};

/// Display strings for a window summary, two decimals each
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeedDisplay {
    pub x: String,
    pub y: String,
    pub total: String,
}

impl From<&WindowSummary> for SpeedDisplay {
    fn from(summary: &WindowSummary) -> Self {
        Self {
            x: format!("{:.2}", summary.average.x),
            y: format!("{:.2}", summary.average.y),
            total: format!("{:.2}", summary.magnitude),
        }
    }
}

impl fmt::Display for SpeedDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X: {}  Y: {}  Total: {}", self.x, self.y, self.total)
    }
}

/// Result of one [`SpeedTracker::update`]
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedUpdate {
    pub event: LifecycleEvent,
    /// Current window summary; `None` while detached
    pub reading: Option<WindowSummary>,
    /// Whether a sample was pushed this update
    pub sampled: bool,
    /// The display text differs from the previous update's
    pub changed: bool,
}

/// Polls the velocity pair and keeps its trailing average.
pub struct SpeedTracker<P: ProcessProvider, C: Clock = MonotonicClock> {
    engine: Engine<P, C>,
    window: WindowedAverage,
    last: Option<WindowSummary>,
    display: Option<SpeedDisplay>,
}

impl<P: ProcessProvider, C: Clock> SpeedTracker<P, C> {
    pub fn new(provider: P, clock: C, config: &TrackerConfig) -> Result<Self> {
        for name in [VELOCITY_X, VELOCITY_Y] {
            if config.value(name).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "speed tracking needs a '{}' value",
                    name
                )));
            }
        }

        Ok(Self {
            engine: Engine::new(provider, clock, config)?,
            window: WindowedAverage::new(config.window()),
            last: None,
            display: None,
        })
    }

    pub fn engine(&self) -> &Engine<P, C> {
        &self.engine
    }

    pub fn window(&self) -> &WindowedAverage {
        &self.window
    }

    /// Display text of the latest summary
    pub fn display(&self) -> Option<&SpeedDisplay> {
        self.display.as_ref()
    }

    /// One host update: tick the engine, sample the velocity, and summarize
    /// the window.
    pub fn update(&mut self) -> SpeedUpdate {
        let event = self.engine.tick();

        if let LifecycleEvent::Exited(_) = event {
            self.window.clear();
            self.last = None;
        }

        if !self.engine.is_attached() {
            return SpeedUpdate {
                event,
                reading: None,
                sampled: false,
                changed: false,
            };
        }

        let (reading, sampled) = match self.read_velocity() {
            Ok(velocity) => {
                let timestamp_ms = self.engine.now().as_millis() as u64;
                let summary = self.window.push(Sample::new(velocity, timestamp_ms));
                self.last = Some(summary);
                (Some(summary), true)
            }
            Err(e) => {
                debug!("Velocity unavailable this tick: {}", e);
                (self.last, false)
            }
        };

        let mut changed = false;
        if let Some(summary) = &reading {
            let display = SpeedDisplay::from(summary);
            if self.display.as_ref() != Some(&display) {
                changed = true;
                self.display = Some(display);
            }
        }

        SpeedUpdate {
            event,
            reading,
            sampled,
            changed,
        }
    }

    pub fn dispose(&mut self) {
        self.engine.dispose();
        self.window.clear();
        self.last = None;
    }

    fn read_velocity(&mut self) -> Result<Vec2> {
        let x = self.engine.try_read_value::<f32>(VELOCITY_X)?;
        let y = self.engine.try_read_value::<f32>(VELOCITY_Y)?;
        match (x, y) {
            (Some(x), Some(y)) => Ok(Vec2::new(x, y)),
            _ => Err(Error::AttachmentFailed("detached during read".to_string())),
        }
    }
}
