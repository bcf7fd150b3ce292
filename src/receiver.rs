//! # Message Receiver
//!
//! Application-facing blocking receive over a push-based broker subscription.
//!
//! Single receives subscribe a one-shot [`SynchronousConsumer`] per call.
//! Batched receives share one long-lived [`ReceiveConsumer`] that pre-fetches
//! into a [`DeliveryBuffer`]. Both paths pass through a [`ReceiveManager`] so
//! delivery can be stopped and restarted without tearing subscriptions down.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{BrokerChannel, Delivery};
use crate::config::BridgeConfig;
use crate::consumer::{DeliveryBuffer, ReceiveConsumer, ReceiveManager, SynchronousConsumer};
use crate::error::{BridgeError, Result};
use crate::logging::log_consumer_operation;
use crate::sync::DeadlineTracker;

/// Blocking receiver bound to one queue
#[derive(Debug)]
pub struct MessageReceiver {
    channel: Arc<dyn BrokerChannel>,
    queue_name: String,
    config: BridgeConfig,
    manager: ReceiveManager,
    batched: Mutex<Option<Arc<ReceiveConsumer>>>,
    /// One-shot consumers of receives currently blocked
    pending: Mutex<Vec<Arc<SynchronousConsumer>>>,
    closed: AtomicBool,
}

impl MessageReceiver {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        queue_name: impl Into<String>,
        config: BridgeConfig,
    ) -> Result<Self> {
        config.validate()?;
        let queue_name = queue_name.into();
        info!(
            queue = %queue_name,
            batching_size = config.batching_size,
            acknowledge_mode = ?config.acknowledge_mode,
            "Message receiver created"
        );

        Ok(Self {
            channel,
            queue_name,
            config,
            manager: ReceiveManager::new(),
            batched: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Receive using the configured timeout (unbounded when 0)
    pub fn receive(&self) -> Result<Option<Delivery>> {
        self.receive_until(&DeadlineTracker::from_optional(self.config.receive_timeout()))
    }

    /// Receive, waiting at most `timeout`
    pub fn receive_timeout(&self, timeout: Duration) -> Result<Option<Delivery>> {
        self.receive_until(&DeadlineTracker::new(timeout))
    }

    /// Receive only what is available right now
    pub fn receive_no_wait(&self) -> Result<Option<Delivery>> {
        self.receive_until(&DeadlineTracker::zero())
    }

    /// Receive with a one-shot consumer, all waits sharing `deadline`.
    ///
    /// A receive blocked here when the receiver is closed returns
    /// [`BridgeError::Closed`].
    pub fn receive_until(&self, deadline: &DeadlineTracker) -> Result<Option<Delivery>> {
        self.ensure_open()?;
        let Some(_guard) = self.manager.enter(deadline) else {
            return Ok(None);
        };

        let consumer = Arc::new(SynchronousConsumer::new(
            Arc::clone(&self.channel),
            self.queue_name.clone(),
            self.config.acknowledge_mode,
        ));
        self.track(&consumer)?;
        let result = self.receive_with(&consumer, deadline);
        self.untrack(&consumer);

        match result {
            Ok(None) if self.is_closed() => Err(self.closed_error()),
            other => other,
        }
    }

    fn receive_with(
        &self,
        consumer: &Arc<SynchronousConsumer>,
        deadline: &DeadlineTracker,
    ) -> Result<Option<Delivery>> {
        consumer.subscribe(self.config.no_local)?;

        let result = consumer.receive(deadline);
        if !consumer.is_satisfied() {
            if let Err(e) = consumer.cancel() {
                warn!(queue = %self.queue_name, error = %e, "Failed to cancel unsatisfied consumer");
            }
        }
        for failure in consumer.take_errors() {
            warn!(queue = %self.queue_name, error = %failure, "Consumer recorded a broker failure");
        }

        if let Ok(Some(delivery)) = &result {
            log_consumer_operation(
                "receive",
                &self.queue_name,
                consumer.consumer_tag().as_deref(),
                Some(delivery.delivery_tag),
                "delivered",
                None,
            );
        }
        result
    }

    /// Register a one-shot consumer so `close` can cancel it
    fn track(&self, consumer: &Arc<SynchronousConsumer>) -> Result<()> {
        let mut pending = self.pending.lock();
        if self.is_closed() {
            return Err(self.closed_error());
        }
        pending.push(Arc::clone(consumer));
        Ok(())
    }

    fn untrack(&self, consumer: &Arc<SynchronousConsumer>) {
        self.pending
            .lock()
            .retain(|tracked| !Arc::ptr_eq(tracked, consumer));
    }

    /// Receives currently blocked on a one-shot consumer
    pub fn pending_receives(&self) -> usize {
        self.pending.lock().len()
    }

    /// Poll the pre-fetch buffer, starting the batched consumer on first use
    pub fn receive_batched(&self, timeout: Duration) -> Result<Option<Delivery>> {
        self.ensure_open()?;
        let deadline = DeadlineTracker::new(timeout);
        let Some(_guard) = self.manager.enter(&deadline) else {
            return Ok(None);
        };
        let buffer = self.batched_buffer()?;

        let Some(delivery) = buffer.poll_until(&deadline) else {
            return Ok(None);
        };
        if self.config.acknowledge_mode.is_auto() {
            self.channel
                .acknowledge(delivery.delivery_tag, false)
                .map_err(|e| BridgeError::acknowledge(delivery.delivery_tag, e.to_string()))?;
        }
        Ok(Some(delivery))
    }

    /// Run a bounded receive on the blocking pool for async callers
    pub async fn receive_async(self: &Arc<Self>, timeout: Duration) -> Result<Option<Delivery>> {
        let receiver = Arc::clone(self);
        tokio::task::spawn_blocking(move || receiver.receive_timeout(timeout))
            .await
            .map_err(|e| BridgeError::internal(format!("receive task failed: {e}")))?
    }

    fn batched_buffer(&self) -> Result<DeliveryBuffer> {
        let mut batched = self.batched.lock();
        // `close` takes this lock after marking the receiver closed
        self.ensure_open()?;
        if let Some(consumer) = batched.as_ref() {
            return Ok(consumer.buffer().clone());
        }

        let buffer = DeliveryBuffer::new(self.config.batching_size)?;
        let consumer = Arc::new(ReceiveConsumer::new(
            Arc::clone(&self.channel),
            self.queue_name.clone(),
            self.config.no_local,
            buffer.clone(),
            self.config.batching_size,
        )?);
        consumer.subscribe()?;
        *batched = Some(consumer);
        Ok(buffer)
    }

    /// The batched consumer, if batched receives have started
    pub fn batched_consumer(&self) -> Option<Arc<ReceiveConsumer>> {
        self.batched.lock().clone()
    }

    /// Hold back new receives and wait up to `drain_timeout` for in-flight ones.
    ///
    /// Returns whether in-flight receives cleared in time.
    pub fn stop(&self) -> bool {
        self.manager.pause();
        let cleared = self.manager.wait_to_clear(self.config.drain_timeout());
        if !cleared {
            warn!(
                queue = %self.queue_name,
                in_flight = self.manager.in_flight(),
                "In-flight receives did not clear before drain timeout"
            );
        }
        cleared
    }

    /// Admit receives again
    pub fn start(&self) -> bool {
        self.manager.resume()
    }

    pub fn is_stopped(&self) -> bool {
        self.manager.is_paused()
    }

    /// Wake blocked receives, cancel the batched consumer and requeue
    /// anything still buffered.
    ///
    /// Later receives fail with [`BridgeError::Closed`].
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Release receives parked on a stopped gate
        self.manager.resume();

        let blocked: Vec<Arc<SynchronousConsumer>> = self.pending.lock().clone();
        for consumer in blocked {
            if let Err(e) = consumer.cancel() {
                warn!(queue = %self.queue_name, error = %e, "Failed to cancel blocked receive on close");
            }
        }

        let Some(consumer) = self.batched.lock().take() else {
            debug!(queue = %self.queue_name, "Receiver closed");
            return Ok(());
        };
        // Nothing is buffered after this, so one drain is enough
        let cancelled = consumer.close();

        let buffered = consumer.buffer().drain();
        let requeued = buffered.len().to_string();
        for delivery in buffered {
            if let Err(e) = self
                .channel
                .negative_acknowledge(delivery.delivery_tag, false, true)
            {
                warn!(
                    queue = %self.queue_name,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Failed to requeue buffered delivery on close"
                );
            }
        }
        log_consumer_operation(
            "close",
            &self.queue_name,
            consumer.consumer_tag().as_deref(),
            None,
            if cancelled.is_ok() { "closed" } else { "cancel_failed" },
            Some(&requeued),
        );
        cancelled
    }

    fn closed_error(&self) -> BridgeError {
        BridgeError::closed(format!("receiver for {}", self.queue_name))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AcknowledgeMode;
    use crate::test_helpers::InMemoryBroker;
    use std::thread;

    fn receiver(broker: &Arc<InMemoryBroker>, config: BridgeConfig) -> Arc<MessageReceiver> {
        let channel: Arc<dyn BrokerChannel> = Arc::clone(broker) as Arc<dyn BrokerChannel>;
        Arc::new(MessageReceiver::new(channel, "orders", config).unwrap())
    }

    #[test]
    fn test_receive_returns_published_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let tag = broker.publish("orders", b"order-1".to_vec());
        let receiver = receiver(&broker, BridgeConfig::default());

        let delivery = receiver.receive_no_wait().unwrap().unwrap();
        assert_eq!(delivery.delivery_tag, tag);
        assert_eq!(broker.acknowledged(), vec![tag]);
        assert_eq!(broker.routing_consumers(), 0);
    }

    #[test]
    fn test_receive_timeout_cancels_unsatisfied_consumer() {
        let broker = Arc::new(InMemoryBroker::new());
        let receiver = receiver(&broker, BridgeConfig::default());

        assert!(receiver
            .receive_timeout(Duration::from_millis(20))
            .unwrap()
            .is_none());
        assert_eq!(broker.cancel_requests().len(), 1);
        assert!(broker.acknowledged().is_empty());
    }

    #[test]
    fn test_receive_wakes_on_later_publish() {
        let broker = Arc::new(InMemoryBroker::new());
        let receiver = receiver(&broker, BridgeConfig::default());

        let publisher = {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                broker.publish("orders", b"late".to_vec())
            })
        };
        let delivery = receiver.receive_timeout(Duration::from_secs(5)).unwrap();
        let tag = publisher.join().unwrap();
        assert_eq!(delivery.map(|d| d.delivery_tag), Some(tag));
    }

    #[test]
    fn test_batched_receive_polls_buffer() {
        let broker = Arc::new(InMemoryBroker::new());
        for n in 0..5u8 {
            broker.publish("orders", vec![n]);
        }
        let config = BridgeConfig::new()
            .with_batching_size(3)
            .with_acknowledge_mode(AcknowledgeMode::Client);
        let receiver = receiver(&broker, config);

        let first = receiver.receive_batched(Duration::ZERO).unwrap().unwrap();
        assert_eq!(first.payload(), &[0]);
        let consumer = receiver.batched_consumer().unwrap();
        assert_eq!(consumer.stats().accepted, 3);
        assert_eq!(consumer.stats().rejected, 2);
        assert_eq!(broker.queued("orders"), 2);
    }

    #[test]
    fn test_stopped_receiver_refuses_until_started() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.publish("orders", b"held".to_vec());
        let receiver = receiver(&broker, BridgeConfig::default());

        assert!(receiver.stop());
        assert!(receiver.is_stopped());
        assert!(receiver
            .receive_timeout(Duration::from_millis(20))
            .unwrap()
            .is_none());
        assert_eq!(broker.queued("orders"), 1);

        assert!(receiver.start());
        assert!(receiver.receive_no_wait().unwrap().is_some());
    }

    #[test]
    fn test_close_requeues_buffered_and_rejects_receives() {
        let broker = Arc::new(InMemoryBroker::new());
        for n in 0..3u8 {
            broker.publish("orders", vec![n]);
        }
        let receiver = receiver(&broker, BridgeConfig::new().with_batching_size(3));
        assert!(receiver.receive_batched(Duration::ZERO).unwrap().is_some());

        receiver.close().unwrap();
        receiver.close().unwrap();
        assert_eq!(broker.nacked().len(), 2);
        assert_eq!(broker.cancel_requests().len(), 1);
        assert!(matches!(
            receiver.receive_no_wait(),
            Err(BridgeError::Closed { .. })
        ));
    }

    #[test]
    fn test_delivery_after_close_is_requeued() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.publish("orders", b"first".to_vec());
        let receiver = receiver(&broker, BridgeConfig::new().with_batching_size(3));
        assert!(receiver.receive_batched(Duration::ZERO).unwrap().is_some());

        let consumer = receiver.batched_consumer().unwrap();
        let consumer_tag = consumer.consumer_tag().unwrap();
        receiver.close().unwrap();
        assert!(consumer.is_closed());

        // Routed by the broker before it processed the cancel
        assert!(broker.deliver(&consumer_tag, Delivery::new(99, b"late".to_vec())));

        assert!(consumer.buffer().is_empty());
        let nacked: Vec<u64> = broker.nacked().iter().map(|n| n.delivery_tag).collect();
        assert_eq!(nacked, vec![99]);
        assert!(matches!(
            receiver.receive_batched(Duration::ZERO),
            Err(BridgeError::Closed { .. })
        ));
    }

    #[test]
    fn test_close_wakes_unbounded_receive() {
        let broker = Arc::new(InMemoryBroker::new());
        let receiver = receiver(&broker, BridgeConfig::default());
        assert_eq!(receiver.config().receive_timeout(), None);

        let blocked = {
            let receiver = Arc::clone(&receiver);
            thread::spawn(move || receiver.receive())
        };
        let deadline = DeadlineTracker::new(Duration::from_secs(5));
        while receiver.pending_receives() == 0 && !deadline.expired() {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(receiver.pending_receives(), 1);

        let start = std::time::Instant::now();
        receiver.close().unwrap();
        let result = blocked.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(matches!(result, Err(BridgeError::Closed { .. })));
        assert_eq!(receiver.pending_receives(), 0);
        assert_eq!(broker.cancel_requests().len(), 1);
        assert!(broker.nacked().is_empty());
    }

    #[tokio::test]
    async fn test_receive_async() {
        let broker = Arc::new(InMemoryBroker::new());
        let tag = broker.publish("orders", b"async".to_vec());
        let receiver = receiver(&broker, BridgeConfig::default());

        let delivery = receiver.receive_async(Duration::from_secs(1)).await.unwrap();
        assert_eq!(delivery.map(|d| d.delivery_tag), Some(tag));
    }
}
