//! Cooldown policies for attachment retries.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum wait between failed attach attempts, whatever the strategy says
pub const MIN_ATTACH_COOLDOWN: Duration = Duration::from_secs(1);

/// Decides how long to wait after the `failures`-th consecutive failure
pub trait RetryStrategy: fmt::Debug + Send {
    /// `failures` starts at 1
    fn delay(&self, failures: u32) -> Duration;
}

/// Same delay after every failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(MIN_ATTACH_COOLDOWN)
    }
}

impl RetryStrategy for FixedDelay {
    fn delay(&self, _failures: u32) -> Duration {
        self.0
    }
}

/// Doubling delay, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl RetryStrategy for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Serialized form of a retry strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryConfig {
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        initial_ms: u64,
        max_ms: u64,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::Fixed { delay_ms: 1000 }
    }
}

impl RetryConfig {
    pub fn build(&self) -> Box<dyn RetryStrategy> {
        match *self {
            Self::Fixed { delay_ms } => Box::new(FixedDelay(Duration::from_millis(delay_ms))),
            Self::Exponential { initial_ms, max_ms } => Box::new(ExponentialBackoff {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms.max(initial_ms)),
            }),
        }
    }
}

/// Delay to apply after a failure, never below [`MIN_ATTACH_COOLDOWN`]
pub fn cooldown(strategy: &dyn RetryStrategy, failures: u32) -> Duration {
    strategy.delay(failures).max(MIN_ATTACH_COOLDOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let strategy = FixedDelay(Duration::from_secs(2));
        assert_eq!(strategy.delay(1), Duration::from_secs(2));
        assert_eq!(strategy.delay(50), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_caps() {
        let strategy = ExponentialBackoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        assert_eq!(strategy.delay(1), Duration::from_secs(1));
        assert_eq!(strategy.delay(2), Duration::from_secs(2));
        assert_eq!(strategy.delay(4), Duration::from_secs(8));
        assert_eq!(strategy.delay(5), Duration::from_secs(10));
        assert_eq!(strategy.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_cooldown_enforces_minimum() {
        let strategy = FixedDelay(Duration::from_millis(100));
        assert_eq!(cooldown(&strategy, 1), MIN_ATTACH_COOLDOWN);
    }

    #[test]
    fn test_retry_config_roundtrip_toml() {
        let config = RetryConfig::Exponential {
            initial_ms: 1000,
            max_ms: 8000,
        };
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("strategy = \"exponential\""));
        let parsed: RetryConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.build().delay(3), Duration::from_secs(4));
    }
}
