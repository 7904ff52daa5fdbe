//! Session configuration types

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default slot table capacity
pub const DEFAULT_MAX_SLOTS: u32 = 64;

/// Configuration for client sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Slot table capacity; the server may grant fewer
    #[serde(default = "default_max_slots")]
    pub max_slots: u32,

    /// Request a persistent reply cache from the server
    #[serde(default = "default_persist")]
    pub persist: bool,

    /// How long teardown waits for the renewal task before aborting it
    #[serde(default = "default_renewal_shutdown_timeout", with = "humantime_serde")]
    pub renewal_shutdown_timeout: Duration,

    /// Buffer size of the session event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_slots() -> u32 {
    DEFAULT_MAX_SLOTS
}

fn default_persist() -> bool {
    true
}

fn default_renewal_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_event_capacity() -> usize {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_slots: default_max_slots(),
            persist: default_persist(),
            renewal_shutdown_timeout: default_renewal_shutdown_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl SessionConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            max_slots = config.max_slots,
            persist = config.persist,
            "SessionConfig loaded"
        );
        Ok(config)
    }

    /// Set the slot table capacity (at least one slot).
    #[must_use]
    pub fn with_max_slots(mut self, max_slots: u32) -> Self {
        self.max_slots = max_slots.max(1);
        self
    }

    /// Set whether sessions request a persistent reply cache.
    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Set the renewal task shutdown timeout.
    #[must_use]
    pub fn with_renewal_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.renewal_shutdown_timeout = timeout;
        self
    }
}
