//! In-memory broker channel for exercising consumers without a broker.
//!
//! Deliveries are pushed on the calling thread. Acknowledgments, negative
//! acknowledgments and cancel requests are recorded for assertions, and each
//! operation can be told to fail. Cancel confirmations are withheld unless a
//! confirmation delay is configured or a test confirms explicitly. A confirmed
//! consumer is unregistered, releasing the broker's handle on it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::broker::{BrokerChannel, Delivery, DeliveryHandler};
use crate::error::{BrokerError, BrokerResult};

/// One recorded negative acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackRecord {
    pub delivery_tag: u64,
    pub multiple: bool,
    pub requeue: bool,
}

struct Registration {
    queue_name: String,
    handler: Arc<dyn DeliveryHandler>,
    routing: bool,
}

/// Recording, failure-injectable [`BrokerChannel`]
#[derive(Default)]
pub struct InMemoryBroker {
    consumers: Arc<DashMap<String, Registration>>,
    backlog: Mutex<HashMap<String, VecDeque<Delivery>>>,
    /// Delivery tag -> (queue, delivery) for requeue
    unsettled: DashMap<u64, (String, Delivery)>,
    next_delivery_tag: AtomicU64,
    acknowledged: Mutex<Vec<u64>>,
    nacked: Mutex<Vec<NackRecord>>,
    cancel_requests: Mutex<Vec<String>>,
    fail_acknowledge: AtomicBool,
    fail_negative_acknowledge: AtomicBool,
    fail_cancel: AtomicBool,
    closed: AtomicBool,
    confirm_delay: Mutex<Option<Duration>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm cancels from a background thread after `delay`
    pub fn with_confirm_delay(self, delay: Duration) -> Self {
        *self.confirm_delay.lock() = Some(delay);
        self
    }

    pub fn fail_acknowledge(&self, fail: bool) {
        self.fail_acknowledge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_negative_acknowledge(&self, fail: bool) {
        self.fail_negative_acknowledge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    /// Close the channel; every later operation fails with `ChannelClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::channel_closed("closed by test broker"));
        }
        Ok(())
    }

    /// Route a new message to a consumer on `queue_name`, or hold it until one subscribes
    pub fn publish(&self, queue_name: &str, payload: impl Into<Arc<[u8]>>) -> u64 {
        let delivery_tag = self.next_delivery_tag.fetch_add(1, Ordering::SeqCst) + 1;
        let delivery = Delivery::new(delivery_tag, payload);
        self.backlog
            .lock()
            .entry(queue_name.to_string())
            .or_default()
            .push_back(delivery);
        self.dispatch(queue_name);
        delivery_tag
    }

    /// Push everything queued on `queue_name` to its first routing consumer.
    ///
    /// Only the messages queued when the call starts are pushed, so requeued
    /// deliveries wait for the next dispatch.
    pub fn dispatch(&self, queue_name: &str) -> usize {
        let Some((consumer_tag, handler)) = self.routing_consumer(queue_name) else {
            return 0;
        };
        let pending: Vec<Delivery> = self
            .backlog
            .lock()
            .get_mut(queue_name)
            .map(|queue| queue.drain(..).collect())
            .unwrap_or_default();

        let count = pending.len();
        for delivery in pending {
            self.unsettled.insert(
                delivery.delivery_tag,
                (queue_name.to_string(), delivery.clone()),
            );
            handler.on_delivery(&consumer_tag, delivery);
        }
        count
    }

    /// Invoke a consumer's delivery callback directly
    pub fn deliver(&self, consumer_tag: &str, delivery: Delivery) -> bool {
        let Some(handler) = self.handler(consumer_tag) else {
            return false;
        };
        handler.on_delivery(consumer_tag, delivery);
        true
    }

    /// Unregister `consumer_tag` and send its cancel confirmation now.
    ///
    /// Returns `false` once the consumer is no longer registered.
    pub fn confirm_cancel(&self, consumer_tag: &str) -> bool {
        confirm_and_unregister(&self.consumers, consumer_tag)
    }

    pub fn handler(&self, consumer_tag: &str) -> Option<Arc<dyn DeliveryHandler>> {
        self.consumers
            .get(consumer_tag)
            .map(|registration| Arc::clone(&registration.handler))
    }

    /// Consumers still registered, routing or not
    pub fn registered_consumers(&self) -> usize {
        self.consumers.len()
    }

    fn routing_consumer(&self, queue_name: &str) -> Option<(String, Arc<dyn DeliveryHandler>)> {
        self.consumers
            .iter()
            .find(|entry| entry.routing && entry.queue_name == queue_name)
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.handler)))
    }

    /// Messages waiting on `queue_name` for a consumer
    pub fn queued(&self, queue_name: &str) -> usize {
        self.backlog.lock().get(queue_name).map_or(0, VecDeque::len)
    }

    pub fn acknowledged(&self) -> Vec<u64> {
        self.acknowledged.lock().clone()
    }

    pub fn nacked(&self) -> Vec<NackRecord> {
        self.nacked.lock().clone()
    }

    pub fn cancel_requests(&self) -> Vec<String> {
        self.cancel_requests.lock().clone()
    }

    /// Consumers still receiving routed messages
    pub fn routing_consumers(&self) -> usize {
        self.consumers.iter().filter(|entry| entry.routing).count()
    }
}

impl BrokerChannel for InMemoryBroker {
    fn subscribe(
        &self,
        queue_name: &str,
        _no_local: bool,
        handler: Arc<dyn DeliveryHandler>,
    ) -> BrokerResult<String> {
        self.ensure_open()?;
        let consumer_tag = format!("amq.ctag-{}", Uuid::new_v4());
        self.consumers.insert(
            consumer_tag.clone(),
            Registration {
                queue_name: queue_name.to_string(),
                handler: Arc::clone(&handler),
                routing: true,
            },
        );
        handler.on_consume_ok(&consumer_tag);
        debug!(queue = %queue_name, consumer_tag = %consumer_tag, "In-memory subscription registered");

        self.dispatch(queue_name);
        Ok(consumer_tag)
    }

    fn acknowledge(&self, delivery_tag: u64, _multiple: bool) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.fail_acknowledge.load(Ordering::SeqCst) {
            return Err(BrokerError::io("acknowledge rejected by test broker"));
        }
        self.unsettled.remove(&delivery_tag);
        self.acknowledged.lock().push(delivery_tag);
        Ok(())
    }

    fn negative_acknowledge(
        &self,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.fail_negative_acknowledge.load(Ordering::SeqCst) {
            return Err(BrokerError::io("negative acknowledge rejected by test broker"));
        }
        self.nacked.lock().push(NackRecord {
            delivery_tag,
            multiple,
            requeue,
        });
        if let Some((_, (queue_name, delivery))) = self.unsettled.remove(&delivery_tag) {
            if requeue {
                self.backlog
                    .lock()
                    .entry(queue_name)
                    .or_default()
                    .push_back(delivery.with_redelivered(true));
            }
        }
        Ok(())
    }

    fn request_cancel(&self, consumer_tag: &str) -> BrokerResult<()> {
        self.ensure_open()?;
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(BrokerError::io("cancel rejected by test broker"));
        }
        match self.consumers.get_mut(consumer_tag) {
            Some(mut registration) => registration.routing = false,
            None => {
                return Err(BrokerError::UnknownConsumer {
                    consumer_tag: consumer_tag.to_string(),
                })
            }
        }
        self.cancel_requests.lock().push(consumer_tag.to_string());

        if let Some(delay) = *self.confirm_delay.lock() {
            let consumers = Arc::clone(&self.consumers);
            let consumer_tag = consumer_tag.to_string();
            thread::spawn(move || {
                thread::sleep(delay);
                confirm_and_unregister(&consumers, &consumer_tag);
            });
        }
        Ok(())
    }
}

fn confirm_and_unregister(consumers: &DashMap<String, Registration>, consumer_tag: &str) -> bool {
    let Some((_, registration)) = consumers.remove(consumer_tag) else {
        return false;
    };
    registration.handler.on_cancel_confirmed(consumer_tag);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::{DeliveryBuffer, ReceiveConsumer};

    #[test]
    fn test_backlog_waits_for_subscriber() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.publish("jobs", b"one".to_vec());
        broker.publish("jobs", b"two".to_vec());
        assert_eq!(broker.queued("jobs"), 2);

        let channel: Arc<dyn BrokerChannel> = Arc::clone(&broker) as Arc<dyn BrokerChannel>;
        let buffer = DeliveryBuffer::new(1).unwrap();
        let consumer =
            Arc::new(ReceiveConsumer::new(channel, "jobs", false, buffer.clone(), 1).unwrap());
        consumer.subscribe().unwrap();

        // One buffered, one requeued by overflow
        assert_eq!(buffer.len(), 1);
        assert_eq!(broker.queued("jobs"), 1);
        assert_eq!(broker.nacked().len(), 1);
    }

    #[test]
    fn test_confirmation_unregisters_and_releases_consumer() {
        let broker = Arc::new(InMemoryBroker::new());
        let channel: Arc<dyn BrokerChannel> = Arc::clone(&broker) as Arc<dyn BrokerChannel>;
        let consumer = Arc::new(crate::consumer::SynchronousConsumer::new(
            channel,
            "jobs",
            crate::constants::AcknowledgeMode::Auto,
        ));
        let tag = consumer.subscribe(false).unwrap();
        assert!(broker.deliver(&tag, Delivery::new(5, b"unclaimed".to_vec())));
        assert_eq!(broker.registered_consumers(), 1);

        assert!(broker.confirm_cancel(&tag));
        assert!(!broker.confirm_cancel(&tag));
        assert_eq!(broker.registered_consumers(), 0);
        assert!(broker.nacked().is_empty());

        // The broker no longer holds the consumer, so dropping it requeues
        assert_eq!(Arc::strong_count(&consumer), 1);
        drop(consumer);
        let nacked: Vec<u64> = broker.nacked().iter().map(|n| n.delivery_tag).collect();
        assert_eq!(nacked, vec![5]);
    }

    #[test]
    fn test_closed_channel_rejects_operations() {
        let broker = InMemoryBroker::new();
        broker.close();
        assert!(matches!(
            broker.acknowledge(1, false),
            Err(BrokerError::ChannelClosed { .. })
        ));
        assert!(matches!(
            broker.negative_acknowledge(1, false, true),
            Err(BrokerError::ChannelClosed { .. })
        ));
        assert!(broker.nacked().is_empty());
    }

    #[test]
    fn test_unknown_consumer_cancel_fails() {
        let broker = InMemoryBroker::new();
        assert!(matches!(
            broker.request_cancel("missing"),
            Err(BrokerError::UnknownConsumer { .. })
        ));
    }
}
