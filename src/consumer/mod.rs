//! # Consumer Adapters
//!
//! Reconcile push delivery with pull-style receive.
//!
//! - [`SynchronousConsumer`]: hands exactly one delivery to one blocked receiver,
//!   then cancels itself
//! - [`ReceiveConsumer`]: pre-fetches deliveries into a shared [`DeliveryBuffer`]
//!   that callers poll directly
//! - [`ReceiveManager`]: pause/resume flow control over in-flight receives
//!
//! Both consumers negatively acknowledge, with requeue, every delivery they do
//! not accept. Broker failures raised on the delivery thread are logged,
//! counted and recorded in a [`FailureLog`]; they never escape a callback.

pub mod buffer;
pub mod receive;
pub mod receive_manager;
pub mod state;
pub mod stats;
pub mod synchronous;

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerChannel, Delivery, DeliveryHandler};
use crate::constants::events;
use crate::error::{BridgeError, Result};

pub use buffer::DeliveryBuffer;
pub use receive::ReceiveConsumer;
pub use receive_manager::{ReceiveGuard, ReceiveManager};
pub use state::{CancelSwitch, ConsumerState};
pub use stats::{ConsumerStats, ConsumerStatsSnapshot, FailureLog};
pub use synchronous::SynchronousConsumer;

/// Why a delivery was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RejectReason {
    /// Hand-off slot already occupied
    SlotOccupied,
    /// Receiver already satisfied or consumer abandoned
    NoLongerAccepting,
    /// Shared buffer at capacity
    BufferFull,
    /// Arrived after the cancel was confirmed
    Straggler,
    /// Left unclaimed when the consumer was abandoned
    Abandoned,
}

/// Broker-facing state common to both consumers
#[derive(Debug)]
pub(crate) struct ConsumerCore {
    pub(crate) channel: Arc<dyn BrokerChannel>,
    pub(crate) queue_name: String,
    pub(crate) cancel: CancelSwitch,
    pub(crate) stats: ConsumerStats,
    pub(crate) failures: FailureLog,
}

impl ConsumerCore {
    pub(crate) fn new(channel: Arc<dyn BrokerChannel>, queue_name: impl Into<String>) -> Self {
        Self {
            channel,
            queue_name: queue_name.into(),
            cancel: CancelSwitch::new(),
            stats: ConsumerStats::default(),
            failures: FailureLog::default(),
        }
    }

    pub(crate) fn subscribe(
        &self,
        no_local: bool,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<String> {
        let consumer_tag = self
            .channel
            .subscribe(&self.queue_name, no_local, handler)
            .map_err(|e| BridgeError::subscribe(&self.queue_name, e.to_string()))?;

        info!(
            event = events::CONSUMER_SUBSCRIBED,
            queue = %self.queue_name,
            consumer_tag = %consumer_tag,
            no_local = no_local,
            "Consumer subscribed"
        );
        Ok(consumer_tag)
    }

    /// Negatively acknowledge with requeue. Failures go to the failure log.
    pub(crate) fn reject(&self, delivery: &Delivery, reason: RejectReason) {
        if reason == RejectReason::Straggler {
            self.stats.record_straggler();
            warn!(
                queue = %self.queue_name,
                delivery_tag = delivery.delivery_tag,
                "Delivery arrived after cancel was confirmed"
            );
        }

        match self
            .channel
            .negative_acknowledge(delivery.delivery_tag, false, true)
        {
            Ok(()) => {
                self.stats.record_rejected();
                debug!(
                    event = events::CONSUMER_DELIVERY_REJECTED,
                    queue = %self.queue_name,
                    delivery_tag = delivery.delivery_tag,
                    reason = ?reason,
                    "Delivery requeued"
                );
            }
            Err(e) => self.record_failure(BridgeError::negative_acknowledge(
                delivery.delivery_tag,
                e.to_string(),
            )),
        }
    }

    pub(crate) fn acknowledge(&self, delivery: &Delivery) -> Result<()> {
        self.channel
            .acknowledge(delivery.delivery_tag, false)
            .map_err(|e| {
                self.stats.record_broker_failure();
                error!(
                    queue = %self.queue_name,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Acknowledge failed"
                );
                BridgeError::acknowledge(delivery.delivery_tag, e.to_string())
            })
    }

    /// Issue the broker cancel if this is the first request and the tag is known
    pub(crate) fn request_cancel(&self) -> Result<()> {
        let Some(consumer_tag) = self.cancel.request() else {
            return Ok(());
        };
        self.issue_cancel(&consumer_tag)
    }

    pub(crate) fn bind(&self, consumer_tag: &str) {
        if let Some(deferred) = self.cancel.bind(consumer_tag) {
            if let Err(e) = self.issue_cancel(&deferred) {
                self.failures.record(e);
            }
        }
    }

    fn issue_cancel(&self, consumer_tag: &str) -> Result<()> {
        match self.channel.request_cancel(consumer_tag) {
            Ok(()) => {
                info!(
                    event = events::CONSUMER_CANCEL_REQUESTED,
                    queue = %self.queue_name,
                    consumer_tag = %consumer_tag,
                    "Consumer cancel requested"
                );
                Ok(())
            }
            Err(e) => {
                self.cancel.rearm();
                self.stats.record_broker_failure();
                error!(
                    queue = %self.queue_name,
                    consumer_tag = %consumer_tag,
                    error = %e,
                    "Cancel request failed"
                );
                Err(BridgeError::cancel(consumer_tag, e.to_string()))
            }
        }
    }

    pub(crate) fn confirm_cancel(&self, consumer_tag: &str) -> bool {
        let first = self.cancel.confirm();
        if first {
            info!(
                event = events::CONSUMER_CANCELLED,
                queue = %self.queue_name,
                consumer_tag = %consumer_tag,
                "Consumer cancel confirmed"
            );
        } else {
            debug!(consumer_tag = %consumer_tag, "Duplicate cancel confirmation ignored");
        }
        first
    }

    fn record_failure(&self, failure: BridgeError) {
        self.stats.record_broker_failure();
        error!(queue = %self.queue_name, error = %failure, "Broker call failed on delivery thread");
        self.failures.record(failure);
    }
}
