//! # Broker Boundary
//!
//! The capability surface this adapter needs from a broker client, and the
//! callback surface it exposes back to that client.
//!
//! Broker operations are synchronous and must be safe to call from any
//! thread. Callbacks are invoked on the broker client's delivery thread and
//! return nothing: failures raised while handling a callback are recorded by
//! the handler and never cross the callback boundary.

pub mod delivery;

use std::fmt;
use std::sync::Arc;

use crate::error::BrokerResult;

pub use delivery::Delivery;

/// Operations a broker channel offers to consumers
pub trait BrokerChannel: Send + Sync {
    /// Start routing messages from `queue_name` to `handler`, returning the consumer tag
    fn subscribe(
        &self,
        queue_name: &str,
        no_local: bool,
        handler: Arc<dyn DeliveryHandler>,
    ) -> BrokerResult<String>;

    /// Confirm consumption of a delivery
    fn acknowledge(&self, delivery_tag: u64, multiple: bool) -> BrokerResult<()>;

    /// Reject a delivery, optionally asking the broker to requeue it
    fn negative_acknowledge(&self, delivery_tag: u64, multiple: bool, requeue: bool)
        -> BrokerResult<()>;

    /// Ask the broker to stop routing to `consumer_tag`.
    ///
    /// Completion is signalled later through
    /// [`DeliveryHandler::on_cancel_confirmed`].
    fn request_cancel(&self, consumer_tag: &str) -> BrokerResult<()>;
}

/// Callbacks the broker client invokes on a subscribed consumer
pub trait DeliveryHandler: Send + Sync {
    /// The subscription is registered under `consumer_tag`
    fn on_consume_ok(&self, consumer_tag: &str);

    /// A message was pushed to this consumer
    fn on_delivery(&self, consumer_tag: &str, delivery: Delivery);

    /// The broker confirmed a cancel request
    fn on_cancel_confirmed(&self, consumer_tag: &str);
}

impl fmt::Debug for dyn BrokerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BrokerChannel")
    }
}
