//! # Synchronous Consumer
//!
//! Bridges one push-delivered message to one pull-style `receive` call.
//!
//! The delivery callback stores at most one delivery in a hand-off slot and
//! wakes the blocked receiver. Every other delivery is negatively acknowledged
//! with requeue so the broker can route it elsewhere. Once a receiver has been
//! satisfied the consumer cancels its own subscription; it is not reused.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ConsumerCore, ConsumerState, ConsumerStatsSnapshot, RejectReason};
use crate::broker::{BrokerChannel, Delivery, DeliveryHandler};
use crate::constants::{events, AcknowledgeMode};
use crate::error::{BridgeError, Result};
use crate::sync::DeadlineTracker;

#[derive(Debug, Default)]
struct HandOffSlot {
    pending: Option<Delivery>,
    /// A receiver has taken a delivery
    satisfied: bool,
    /// Cancelled or abandoned before satisfaction
    closed: bool,
}

impl HandOffSlot {
    fn accepts(&self) -> bool {
        !self.satisfied && !self.closed && self.pending.is_none()
    }
}

/// One-shot consumer handing a single delivery to a blocked receiver
#[derive(Debug)]
pub struct SynchronousConsumer {
    core: ConsumerCore,
    acknowledge_mode: AcknowledgeMode,
    slot: Mutex<HandOffSlot>,
    handed_off: Condvar,
}

impl SynchronousConsumer {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        queue_name: impl Into<String>,
        acknowledge_mode: AcknowledgeMode,
    ) -> Self {
        Self {
            core: ConsumerCore::new(channel, queue_name),
            acknowledge_mode,
            slot: Mutex::new(HandOffSlot::default()),
            handed_off: Condvar::new(),
        }
    }

    /// Register this consumer with the broker and return its consumer tag
    pub fn subscribe(self: &Arc<Self>, no_local: bool) -> Result<String> {
        let handler: Arc<dyn DeliveryHandler> = Arc::clone(self) as Arc<dyn DeliveryHandler>;
        self.core.subscribe(no_local, handler)
    }

    /// Block until a delivery is handed off, the deadline passes, or the
    /// consumer is cancelled.
    ///
    /// A handed-off delivery triggers the self-cancel and, in
    /// [`AcknowledgeMode::Auto`], is acknowledged before being returned.
    /// Timeout and cancellation return `Ok(None)` and issue no broker call.
    pub fn receive(&self, deadline: &DeadlineTracker) -> Result<Option<Delivery>> {
        let Some(delivery) = self.take_handed_off(deadline) else {
            debug!(queue = %self.core.queue_name, "Receive returned without a delivery");
            return Ok(None);
        };

        if let Err(e) = self.core.request_cancel() {
            // Later deliveries are still rejected by the slot
            self.core.failures.record(e);
        }

        if self.acknowledge_mode.is_auto() {
            self.core.acknowledge(&delivery)?;
        }

        debug!(
            event = events::CONSUMER_DELIVERY_ACCEPTED,
            queue = %self.core.queue_name,
            delivery_tag = delivery.delivery_tag,
            "Delivery handed to receiver"
        );
        Ok(Some(delivery))
    }

    fn take_handed_off(&self, deadline: &DeadlineTracker) -> Option<Delivery> {
        let mut slot = self.slot.lock();
        loop {
            if slot.satisfied {
                return None;
            }
            if let Some(delivery) = slot.pending.take() {
                slot.satisfied = true;
                return Some(delivery);
            }
            if slot.closed {
                return None;
            }
            if !deadline.wait_on(&self.handed_off, &mut slot) {
                // A delivery may have landed right at the deadline
                let delivery = slot.pending.take();
                slot.satisfied = delivery.is_some();
                return delivery;
            }
        }
    }

    /// Stop accepting deliveries and ask the broker to cancel the subscription.
    ///
    /// Returns without waiting for the broker's confirmation. A delivery left
    /// unclaimed in the slot is requeued. Calling this again, or after the
    /// consumer was satisfied, has no further effect.
    pub fn cancel(&self) -> Result<()> {
        let abandoned = {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.pending.take()
        };
        self.handed_off.notify_all();

        if let Some(delivery) = abandoned {
            self.core.reject(&delivery, RejectReason::Abandoned);
        }
        self.core.request_cancel()
    }

    pub fn is_satisfied(&self) -> bool {
        self.slot.lock().satisfied
    }

    pub fn state(&self) -> ConsumerState {
        self.core.cancel.state()
    }

    pub fn queue_name(&self) -> &str {
        &self.core.queue_name
    }

    pub fn consumer_tag(&self) -> Option<String> {
        self.core.cancel.consumer_tag()
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.core.stats.snapshot()
    }

    /// Broker failures recorded on the delivery thread since the last call
    pub fn take_errors(&self) -> Vec<BridgeError> {
        self.core.failures.take()
    }
}

impl DeliveryHandler for SynchronousConsumer {
    fn on_consume_ok(&self, consumer_tag: &str) {
        self.core.bind(consumer_tag);
    }

    fn on_delivery(&self, consumer_tag: &str, delivery: Delivery) {
        let rejected = {
            let mut slot = self.slot.lock();
            if slot.accepts() {
                slot.pending = Some(delivery);
                None
            } else if slot.pending.is_some() {
                Some((delivery, RejectReason::SlotOccupied))
            } else {
                Some((delivery, RejectReason::NoLongerAccepting))
            }
        };

        match rejected {
            None => {
                self.core.stats.record_accepted();
                self.handed_off.notify_all();
                debug!(
                    queue = %self.core.queue_name,
                    consumer_tag = %consumer_tag,
                    "Delivery placed in hand-off slot"
                );
            }
            Some((delivery, reason)) => {
                let reason = if self.state() == ConsumerState::Cancelled {
                    RejectReason::Straggler
                } else {
                    reason
                };
                self.core.reject(&delivery, reason);
            }
        }
    }

    fn on_cancel_confirmed(&self, consumer_tag: &str) {
        if self.core.confirm_cancel(consumer_tag) {
            self.slot.lock().closed = true;
            self.handed_off.notify_all();
        }
    }
}

impl Drop for SynchronousConsumer {
    fn drop(&mut self) {
        if let Some(delivery) = self.slot.get_mut().pending.take() {
            warn!(
                queue = %self.core.queue_name,
                delivery_tag = delivery.delivery_tag,
                "Requeueing delivery left in a dropped consumer"
            );
            self.core.reject(&delivery, RejectReason::Abandoned);
        }
    }
}
