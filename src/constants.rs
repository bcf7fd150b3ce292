//! # System Constants
//!
//! Defaults and names that define the operational boundaries of the adapter.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured log event names
pub mod events {
    pub const CONSUMER_SUBSCRIBED: &str = "consumer.subscribed";
    pub const CONSUMER_DELIVERY_ACCEPTED: &str = "consumer.delivery_accepted";
    pub const CONSUMER_DELIVERY_REJECTED: &str = "consumer.delivery_rejected";
    pub const CONSUMER_CANCEL_REQUESTED: &str = "consumer.cancel_requested";
    pub const CONSUMER_CANCELLED: &str = "consumer.cancelled";
    pub const RECEIVER_PAUSED: &str = "receiver.paused";
    pub const RECEIVER_RESUMED: &str = "receiver.resumed";
}

/// Defaults applied when no configuration overrides them
pub mod defaults {
    /// Shared buffer bound for the batched consumer
    pub const BATCHING_SIZE: usize = 10;
    /// 0 means `receive()` waits without bound
    pub const RECEIVE_TIMEOUT_MS: u64 = 0;
    /// Bound on waiting for in-flight receives when stopping
    pub const DRAIN_TIMEOUT_MS: u64 = 5_000;
    /// Environment variable prefix for configuration overrides
    pub const ENV_PREFIX: &str = "PULL_BRIDGE";
}

/// Who acknowledges a delivery handed to a synchronous receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgeMode {
    /// The consumer acknowledges before returning the delivery
    #[default]
    Auto,
    /// The caller acknowledges through the channel
    Client,
}

impl AcknowledgeMode {
    pub fn is_auto(self) -> bool {
        matches!(self, AcknowledgeMode::Auto)
    }
}

/// Convert a millisecond setting where 0 means "no bound"
pub fn optional_millis(ms: u64) -> Option<Duration> {
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledge_mode_serde() {
        let mode: AcknowledgeMode = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(mode, AcknowledgeMode::Client);
        assert!(!mode.is_auto());
        assert!(AcknowledgeMode::default().is_auto());
    }

    #[test]
    fn test_optional_millis() {
        assert_eq!(optional_millis(0), None);
        assert_eq!(optional_millis(250), Some(Duration::from_millis(250)));
    }
}
