//! Delivery unit pushed by the broker client

use std::fmt;
use std::sync::Arc;

/// One message instance pushed to a consumer
#[derive(Clone)]
pub struct Delivery {
    /// Broker-assigned sequence number used for acknowledgment
    pub delivery_tag: u64,
    /// Whether the broker has delivered this message before
    pub redelivered: bool,
    /// Opaque message payload
    pub payload: Arc<[u8]>,
}

impl Delivery {
    pub fn new(delivery_tag: u64, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            delivery_tag,
            redelivered: false,
            payload: payload.into(),
        }
    }

    pub fn with_redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    /// True when both deliveries carry the very same payload allocation
    pub fn same_payload(&self, other: &Delivery) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("redelivered", &self.redelivered)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_identity() {
        let first = Delivery::new(1, b"hello".to_vec());
        let clone = first.clone();
        let other = Delivery::new(1, b"hello".to_vec());

        assert!(first.same_payload(&clone));
        assert!(!first.same_payload(&other));
        assert_eq!(first.payload(), other.payload());
    }

    #[test]
    fn test_debug_hides_payload_bytes() {
        let delivery = Delivery::new(9, vec![0u8; 64]).with_redelivered(true);
        let debug = format!("{delivery:?}");
        assert!(debug.contains("delivery_tag: 9"));
        assert!(debug.contains("payload_len: 64"));
        assert!(delivery.redelivered);
    }
}
