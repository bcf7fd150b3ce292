//! # Error Types
//!
//! Structured error handling for the adapter using thiserror. Broker channel
//! implementations report [`BrokerError`]; the consumers wrap those into the
//! [`BridgeError`] kind of the action that failed.

use thiserror::Error;

/// Failure reported by a broker channel implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Channel is closed: {reason}")]
    ChannelClosed { reason: String },

    #[error("Broker I/O failure: {message}")]
    Io { message: String },

    #[error("Unknown consumer tag: {consumer_tag}")]
    UnknownConsumer { consumer_tag: String },
}

impl BrokerError {
    /// Create a channel closed error
    pub fn channel_closed(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: reason.into(),
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }
}

/// Result type returned by broker channel operations
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Adapter-level error kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Acknowledge failed for delivery {delivery_tag}: {message}")]
    Acknowledge { delivery_tag: u64, message: String },

    #[error("Negative acknowledge failed for delivery {delivery_tag}: {message}")]
    NegativeAcknowledge { delivery_tag: u64, message: String },

    #[error("Cancel failed for consumer {consumer_tag}: {message}")]
    Cancel {
        consumer_tag: String,
        message: String,
    },

    #[error("Subscribe failed on queue {queue_name}: {message}")]
    Subscribe { queue_name: String, message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("{component} is closed")]
    Closed { component: String },

    #[error("Internal adapter error: {message}")]
    Internal { message: String },
}

impl BridgeError {
    /// Create an acknowledge error
    pub fn acknowledge(delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::Acknowledge {
            delivery_tag,
            message: message.into(),
        }
    }

    /// Create a negative acknowledge error
    pub fn negative_acknowledge(delivery_tag: u64, message: impl Into<String>) -> Self {
        Self::NegativeAcknowledge {
            delivery_tag,
            message: message.into(),
        }
    }

    /// Create a cancel error
    pub fn cancel(consumer_tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cancel {
            consumer_tag: consumer_tag.into(),
            message: message.into(),
        }
    }

    /// Create a subscribe error
    pub fn subscribe(queue_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subscribe {
            queue_name: queue_name.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a closed error
    pub fn closed(component: impl Into<String>) -> Self {
        Self::Closed {
            component: component.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Delivery tag the error concerns, if any
    pub fn delivery_tag(&self) -> Option<u64> {
        match self {
            Self::Acknowledge { delivery_tag, .. }
            | Self::NegativeAcknowledge { delivery_tag, .. } => Some(*delivery_tag),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(err: config::ConfigError) -> Self {
        BridgeError::configuration("config", err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_creation() {
        let ack_err = BridgeError::acknowledge(7, "channel closed");
        assert!(matches!(ack_err, BridgeError::Acknowledge { .. }));
        assert_eq!(ack_err.delivery_tag(), Some(7));

        let cancel_err = BridgeError::cancel("ctag-1", "broker gone");
        assert!(matches!(cancel_err, BridgeError::Cancel { .. }));
        assert_eq!(cancel_err.delivery_tag(), None);
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::negative_acknowledge(42, "connection reset");
        let display_str = format!("{err}");
        assert!(display_str.contains("Negative acknowledge failed"));
        assert!(display_str.contains("42"));
        assert!(display_str.contains("connection reset"));

        let broker_err = BrokerError::io("socket timeout");
        assert_eq!(format!("{broker_err}"), "Broker I/O failure: socket timeout");
    }

    #[test]
    fn test_config_error_conversion() {
        let config_err = config::ConfigError::Message("bad value".to_string());
        let err: BridgeError = config_err.into();
        assert!(matches!(err, BridgeError::Configuration { .. }));
    }
}
