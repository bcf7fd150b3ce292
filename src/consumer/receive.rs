//! # Receive Consumer
//!
//! Pre-fetches deliveries into a shared [`DeliveryBuffer`] ahead of
//! application demand. Callers never call into this consumer to receive;
//! they poll the buffer directly. A delivery that would overflow the buffer is
//! negatively acknowledged with requeue instead of being dropped or blocking
//! the delivery thread.
//!
//! The accept decision and the enqueue happen under one admission lock that
//! cancel confirmation and [`ReceiveConsumer::close`] also take, so a delivery
//! is either buffered before either of those or rejected after.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ConsumerCore, ConsumerState, ConsumerStatsSnapshot, DeliveryBuffer, RejectReason};
use crate::broker::{BrokerChannel, Delivery, DeliveryHandler};
use crate::constants::events;
use crate::error::{BridgeError, Result};

/// Long-lived consumer feeding a bounded shared buffer
#[derive(Debug)]
pub struct ReceiveConsumer {
    core: ConsumerCore,
    no_local: bool,
    buffer: DeliveryBuffer,
    batching_size: usize,
    /// Set once the owner stops draining the buffer
    closed: Mutex<bool>,
}

impl ReceiveConsumer {
    /// Create a consumer feeding `buffer`.
    ///
    /// `batching_size` must match the buffer's capacity.
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        queue_name: impl Into<String>,
        no_local: bool,
        buffer: DeliveryBuffer,
        batching_size: usize,
    ) -> Result<Self> {
        if batching_size != buffer.capacity() {
            return Err(BridgeError::configuration(
                "receive_consumer",
                format!(
                    "batching size {batching_size} does not match buffer capacity {}",
                    buffer.capacity()
                ),
            ));
        }

        let queue_name = queue_name.into();
        info!(
            queue = %queue_name,
            batching_size = batching_size,
            no_local = no_local,
            "Receive consumer created"
        );

        Ok(Self {
            core: ConsumerCore::new(channel, queue_name),
            no_local,
            buffer,
            batching_size,
            closed: Mutex::new(false),
        })
    }

    /// Register this consumer with the broker and return its consumer tag
    pub fn subscribe(self: &Arc<Self>) -> Result<String> {
        let handler: Arc<dyn DeliveryHandler> = Arc::clone(self) as Arc<dyn DeliveryHandler>;
        self.core.subscribe(self.no_local, handler)
    }

    /// Ask the broker to cancel the subscription and return immediately.
    ///
    /// Deliveries already buffered stay available to pollers.
    pub fn cancel(&self) -> Result<()> {
        self.core.request_cancel()
    }

    /// Stop buffering and request the broker cancel.
    ///
    /// Every delivery that arrives afterwards is requeued, so the owner can
    /// drain the buffer once and know nothing lands in it later.
    pub fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        self.core.request_cancel()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Handle to the shared buffer
    pub fn buffer(&self) -> &DeliveryBuffer {
        &self.buffer
    }

    pub fn batching_size(&self) -> usize {
        self.batching_size
    }

    pub fn no_local(&self) -> bool {
        self.no_local
    }

    pub fn queue_name(&self) -> &str {
        &self.core.queue_name
    }

    pub fn consumer_tag(&self) -> Option<String> {
        self.core.cancel.consumer_tag()
    }

    pub fn state(&self) -> ConsumerState {
        self.core.cancel.state()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Broker failures recorded on the delivery thread since the last call
    pub fn take_errors(&self) -> Vec<BridgeError> {
        self.core.failures.take()
    }
}

impl DeliveryHandler for ReceiveConsumer {
    fn on_consume_ok(&self, consumer_tag: &str) {
        self.core.bind(consumer_tag);
    }

    fn on_delivery(&self, consumer_tag: &str, delivery: Delivery) {
        let delivery_tag = delivery.delivery_tag;
        let outcome = {
            let closed = self.closed.lock();
            if self.state() == ConsumerState::Cancelled {
                Err((delivery, RejectReason::Straggler))
            } else if *closed {
                Err((delivery, RejectReason::NoLongerAccepting))
            } else {
                self.buffer
                    .offer(delivery)
                    .map_err(|overflow| (overflow, RejectReason::BufferFull))
            }
        };

        match outcome {
            Ok(()) => {
                self.core.stats.record_accepted();
                debug!(
                    event = events::CONSUMER_DELIVERY_ACCEPTED,
                    queue = %self.core.queue_name,
                    consumer_tag = %consumer_tag,
                    delivery_tag = delivery_tag,
                    buffered = self.buffer.len(),
                    "Delivery buffered"
                );
            }
            Err((rejected, reason)) => self.core.reject(&rejected, reason),
        }
    }

    fn on_cancel_confirmed(&self, consumer_tag: &str) {
        let _admission = self.closed.lock();
        self.core.confirm_cancel(consumer_tag);
    }
}
