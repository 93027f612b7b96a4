use serde::{Deserialize, Serialize};
use std::path::Path;

use super::defaults::{DEFAULT_EVENT_BUFFER, DEFAULT_HISTORY_CAPACITY};
use crate::error::{Result, SnifflesError};
use crate::policy::{FailureKind, FaultPolicySnapshot};

/// Sniffles configuration
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```json
/// { "history_capacity": 100, "faults": { "delay_ms": 250 } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnifflesConfig {
    /// Maximum number of call records kept in history
    pub history_capacity: usize,

    /// Per-observer event buffer size
    pub event_buffer: usize,

    /// Fault policy applied at startup
    pub faults: FaultConfig,
}

/// Initial fault policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FaultConfig {
    pub failure_enabled: bool,
    pub failure_kind: FailureKind,
    pub delay_ms: u64,
    pub infinite_stall: bool,
}

impl From<FaultConfig> for FaultPolicySnapshot {
    fn from(config: FaultConfig) -> Self {
        Self {
            failure_enabled: config.failure_enabled,
            failure_kind: config.failure_kind,
            delay_ms: config.delay_ms,
            infinite_stall: config.infinite_stall,
        }
    }
}

impl Default for SnifflesConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            event_buffer: DEFAULT_EVENT_BUFFER,
            faults: FaultConfig::default(),
        }
    }
}

impl SnifflesConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(SnifflesError::InvalidConfig(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(SnifflesError::InvalidConfig(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
