//! Bus configuration
//!
//! All knobs are fixed when the bus is initialized. Only strict mode and the
//! error callback can be changed on a running bus.
//!
//! Configuration can be built in code (`BusConfig::default()` plus struct
//! update syntax) or loaded from a TOML file:
//!
//! ```toml
//! queue_capacity = 32
//! strict = true
//! max_idle_ms = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid setting '{key}': {reason}")]
    Invalid { key: String, reason: String },

    /// I/O error while reading a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration for the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
    /// Longest module, action or event name kept intact, in bytes.
    pub max_name_len: usize,
    /// Longest pattern kept intact, in bytes.
    pub max_pattern_len: usize,
    /// Name given to the worker thread.
    pub worker_name: String,
    /// Stack size of the worker thread, in bytes.
    pub worker_stack_size: usize,
    /// Report requests to unknown modules instead of dropping them.
    pub strict: bool,
    /// Longest the loop idles before re-evaluating timers.
    pub max_idle_ms: u64,
    /// Shortest wait between timer evaluations.
    pub min_wait_ms: u64,
    /// Scheduling tick; timers are swept at most once per tick.
    pub tick_period_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            max_name_len: 15,
            max_pattern_len: 31,
            worker_name: "tinybus".to_string(),
            worker_stack_size: 256 * 1024,
            strict: false,
            max_idle_ms: 100,
            min_wait_ms: 1,
            tick_period_ms: 1,
        }
    }
}

impl BusConfig {
    /// Parse a configuration from TOML text. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: BusConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check that every knob is usable.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("queue_capacity", self.queue_capacity as u64),
            ("max_name_len", self.max_name_len as u64),
            ("max_pattern_len", self.max_pattern_len as u64),
            ("worker_stack_size", self.worker_stack_size as u64),
            ("max_idle_ms", self.max_idle_ms),
            ("min_wait_ms", self.min_wait_ms),
            ("tick_period_ms", self.tick_period_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        if self.min_wait_ms > self.max_idle_ms {
            return Err(invalid("min_wait_ms", "must not exceed max_idle_ms"));
        }
        if self.max_pattern_len <= self.max_name_len {
            return Err(invalid("max_pattern_len", "must exceed max_name_len"));
        }
        if self.worker_name.is_empty() {
            return Err(invalid("worker_name", "must not be empty"));
        }
        Ok(())
    }

    /// Longest idle wait of the dispatch loop.
    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    /// Shortest wait of the dispatch loop.
    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    /// Scheduling tick length.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
