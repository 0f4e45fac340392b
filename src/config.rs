//! Session tuning parameters

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{BusError, Result};

/// Timing and buffering knobs for a [`BusSession`](crate::BusSession).
///
/// Every field has a default, so a YAML document only needs the keys it
/// overrides:
///
/// ```rust
/// use canbench::SessionConfig;
///
/// let config = SessionConfig::from_yaml("poll_timeout_ms: 50\n").unwrap();
/// assert_eq!(config.poll_timeout_ms, 50);
/// assert_eq!(config.join_timeout_ms, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Receive poll timeout; bounds how long a stop request goes unnoticed
    pub poll_timeout_ms: u64,

    /// How long disconnect waits for the receive task before reporting a fault
    pub join_timeout_ms: u64,

    /// Events buffered per subscriber before slow subscribers start lagging
    pub event_capacity: usize,

    /// Base delay after a receive fault, doubled per consecutive fault
    pub error_backoff_ms: u64,

    /// Upper bound for the receive fault backoff
    pub max_error_backoff_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 100,
            join_timeout_ms: 2000,
            event_capacity: 1024,
            error_backoff_ms: 50,
            max_error_backoff_ms: 1000,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout_ms == 0 {
            return Err(BusError::validation("session config", "poll_timeout_ms must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(BusError::validation("session config", "event_capacity must be positive"));
        }
        if self.max_error_backoff_ms < self.error_backoff_ms {
            return Err(BusError::validation(
                "session config",
                "max_error_backoff_ms must not be below error_backoff_ms",
            ));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// Backoff after `consecutive` receive faults in a row.
    pub fn error_backoff(&self, consecutive: u32) -> Duration {
        let factor = 1u64 << consecutive.saturating_sub(1).min(5);
        Duration::from_millis(self.error_backoff_ms.saturating_mul(factor).min(self.max_error_backoff_ms))
    }
}
