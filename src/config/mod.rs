//! # Configuration
//!
//! Settings for the receive facade and the consumers it creates. Values come
//! from built-in defaults, then an optional file, then environment overrides
//! (see [`ConfigLoader`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pull_bridge::config::{BridgeConfig, ConfigLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults plus PULL_BRIDGE_* environment overrides
//! let config = ConfigLoader::new().load()?;
//! assert!(config.batching_size >= 1);
//!
//! // Or build one in code
//! let config = BridgeConfig::new().with_batching_size(32).with_no_local(true);
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, optional_millis, AcknowledgeMode};
use crate::error::{BridgeError, Result};

pub use loader::ConfigLoader;

/// Receive facade configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bound of the shared buffer used for batched receives
    pub batching_size: usize,

    /// Budget for `receive()`; 0 waits without bound
    pub receive_timeout_ms: u64,

    /// Bound on waiting for in-flight receives when stopping
    pub drain_timeout_ms: u64,

    /// Who acknowledges deliveries handed to receivers
    pub acknowledge_mode: AcknowledgeMode,

    /// Ask the broker not to deliver messages published on this connection
    pub no_local: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            batching_size: defaults::BATCHING_SIZE,
            receive_timeout_ms: defaults::RECEIVE_TIMEOUT_MS,
            drain_timeout_ms: defaults::DRAIN_TIMEOUT_MS,
            acknowledge_mode: AcknowledgeMode::default(),
            no_local: false,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batching_size(mut self, batching_size: usize) -> Self {
        self.batching_size = batching_size;
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_acknowledge_mode(mut self, mode: AcknowledgeMode) -> Self {
        self.acknowledge_mode = mode;
        self
    }

    pub fn with_no_local(mut self, no_local: bool) -> Self {
        self.no_local = no_local;
        self
    }

    /// Budget for `receive()`, `None` when unbounded
    pub fn receive_timeout(&self) -> Option<Duration> {
        optional_millis(self.receive_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batching_size == 0 {
            return Err(BridgeError::configuration(
                "batching_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
