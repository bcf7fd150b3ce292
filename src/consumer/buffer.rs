//! # Delivery Buffer
//!
//! Bounded, externally-owned queue of deliveries. The batched consumer
//! produces into it without blocking; callers poll it with their own timeout.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use crate::broker::Delivery;
use crate::error::{BridgeError, Result};
use crate::sync::DeadlineTracker;

/// Cloneable handle to a bounded delivery queue
#[derive(Debug, Clone)]
pub struct DeliveryBuffer {
    sender: Sender<Delivery>,
    receiver: Receiver<Delivery>,
    capacity: usize,
}

impl DeliveryBuffer {
    /// Create a buffer holding at most `capacity` deliveries
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(BridgeError::configuration(
                "delivery_buffer",
                "capacity must be at least 1",
            ));
        }
        let (sender, receiver) = channel::bounded(capacity);
        Ok(Self {
            sender,
            receiver,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Enqueue without blocking. A full buffer hands the delivery back.
    pub fn offer(&self, delivery: Delivery) -> std::result::Result<(), Delivery> {
        self.sender.try_send(delivery).map_err(|e| match e {
            TrySendError::Full(d) | TrySendError::Disconnected(d) => d,
        })
    }

    /// Take the next delivery, waiting up to `timeout`
    pub fn poll(&self, timeout: Duration) -> Option<Delivery> {
        self.poll_until(&DeadlineTracker::new(timeout))
    }

    /// Take the next delivery within the tracker's remaining time
    pub fn poll_until(&self, deadline: &DeadlineTracker) -> Option<Delivery> {
        if deadline.is_unbounded() {
            return self.receiver.recv().ok();
        }
        if deadline.expired() {
            return self.try_poll();
        }
        match self.receiver.recv_timeout(deadline.remaining()) {
            Ok(delivery) => Some(delivery),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_poll(&self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    /// Remove everything currently buffered
    pub fn drain(&self) -> Vec<Delivery> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(matches!(
            DeliveryBuffer::new(0),
            Err(BridgeError::Configuration { .. })
        ));
    }

    #[test]
    fn test_offer_respects_capacity() {
        let buffer = DeliveryBuffer::new(2).unwrap();
        assert!(buffer.offer(Delivery::new(1, b"a".to_vec())).is_ok());
        assert!(buffer.offer(Delivery::new(2, b"b".to_vec())).is_ok());
        assert!(buffer.is_full());

        let returned = buffer.offer(Delivery::new(3, b"c".to_vec())).unwrap_err();
        assert_eq!(returned.delivery_tag, 3);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_poll_preserves_order_and_times_out() {
        let buffer = DeliveryBuffer::new(4).unwrap();
        buffer.offer(Delivery::new(1, b"a".to_vec())).unwrap();
        buffer.offer(Delivery::new(2, b"b".to_vec())).unwrap();

        assert_eq!(buffer.poll(Duration::ZERO).map(|d| d.delivery_tag), Some(1));
        assert_eq!(buffer.try_poll().map(|d| d.delivery_tag), Some(2));

        let start = Instant::now();
        assert!(buffer.poll(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_poll_wakes_on_offer_from_another_thread() {
        let buffer = DeliveryBuffer::new(1).unwrap();
        let producer = buffer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.offer(Delivery::new(5, b"late".to_vec())).unwrap();
        });

        let delivery = buffer.poll(Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(delivery.map(|d| d.delivery_tag), Some(5));
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = DeliveryBuffer::new(3).unwrap();
        for tag in 1..=3 {
            buffer.offer(Delivery::new(tag, vec![tag as u8])).unwrap();
        }
        let drained: Vec<u64> = buffer.drain().into_iter().map(|d| d.delivery_tag).collect();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }
}
