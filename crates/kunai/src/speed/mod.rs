//! Velocity samples and their trailing-window average.

mod tracker;

pub use tracker::{SpeedDisplay, SpeedTracker, SpeedUpdate};

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::process::round_hundredths_f32;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(1000);

/// A 2D velocity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn magnitude(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Both components rounded to two decimals
    pub fn rounded(self) -> Self {
        Self {
            x: round_hundredths_f32(self.x),
            y: round_hundredths_f32(self.y),
        }
    }
}

impl fmt::Display for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// A velocity captured at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub value: Vec2,
    /// Milliseconds on the engine clock
    pub timestamp_ms: u64,
}

impl Sample {
    /// The value is rounded to two decimals on capture
    pub fn new(value: Vec2, timestamp_ms: u64) -> Self {
        Self {
            value: value.rounded(),
            timestamp_ms,
        }
    }
}

/// Average of the samples currently in the window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowSummary {
    pub average: Vec2,
    pub magnitude: f32,
    pub samples: usize,
}

/// Equal-weight moving average over a trailing time window.
///
/// A sample is evicted once it is `window` or more older than the newest
/// sample.
#[derive(Debug, Clone)]
pub struct WindowedAverage {
    window_ms: u64,
    samples: VecDeque<Sample>,
}

impl Default for WindowedAverage {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl WindowedAverage {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: window.as_millis() as u64,
            samples: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Add a sample, drop the ones that aged out, and summarize the rest
    pub fn push(&mut self, sample: Sample) -> WindowSummary {
        let now = sample.timestamp_ms;
        self.samples.push_back(sample);
        while let Some(oldest) = self.samples.front() {
            if now.saturating_sub(oldest.timestamp_ms) < self.window_ms {
                break;
            }
            self.samples.pop_front();
        }
        self.summary()
    }

    pub fn summary(&self) -> WindowSummary {
        if self.samples.is_empty() {
            return WindowSummary::default();
        }

        let (sum_x, sum_y) = self.samples.iter().fold((0.0f64, 0.0f64), |(x, y), s| {
            (x + f64::from(s.value.x), y + f64::from(s.value.y))
        });
        let n = self.samples.len() as f64;
        let average = Vec2::new((sum_x / n) as f32, (sum_y / n) as f32);

        WindowSummary {
            average,
            magnitude: average.magnitude(),
            samples: self.samples.len(),
        }
    }
}
