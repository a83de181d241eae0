//! Scheduler configuration.
//!
//! ```rust
//! use cadence_core::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_json(r#"{ "frame_interval_ms": 8 }"#).unwrap();
//! assert_eq!(config.frame_interval_ms, 8);
//! assert_eq!(config.flush_budget_us, 4_000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Frame cadence and flush budget for a [`FrameScheduler`].
///
/// Missing fields take their defaults.
///
/// [`FrameScheduler`]: crate::frame::FrameScheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Milliseconds between frames for clocks that generate their own
    /// cadence. 16 is roughly 60 Hz.
    pub frame_interval_ms: u64,
    /// A flush taking longer than this many microseconds is logged as a
    /// warning.
    pub flush_budget_us: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            flush_budget_us: 4_000,
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "frame_interval_ms",
            });
        }
        if self.flush_budget_us == 0 {
            return Err(ConfigError::Invalid {
                field: "flush_budget_us",
            });
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn flush_budget(&self) -> Duration {
        Duration::from_micros(self.flush_budget_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.flush_budget(), Duration::from_micros(4_000));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let error = SchedulerConfig::from_json(r#"{ "frame_interval_ms": 0 }"#).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "frame_interval_ms"
            }
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let error = SchedulerConfig::from_json("{ frame_interval_ms: }").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn round_trips_through_json() {
        let config = SchedulerConfig {
            frame_interval_ms: 33,
            flush_budget_us: 1_500,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(SchedulerConfig::from_json(&json).unwrap(), config);
    }
}
