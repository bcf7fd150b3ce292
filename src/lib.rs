#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pull Bridge
//!
//! Blocking, pull-style receive on top of a push-based broker consumer
//! protocol where every delivery must be acknowledged, negatively
//! acknowledged (requeued), or left pending.
//!
//! ## Architecture
//!
//! The broker client pushes deliveries into consumer callbacks on its own
//! thread. Application threads block in `receive` until a delivery is handed
//! off or their deadline passes. The hand-off point is the only shared state:
//! a single slot for [`SynchronousConsumer`], a bounded buffer for
//! [`ReceiveConsumer`]. Each delivery is either accepted there or requeued.
//!
//! ## Module Organization
//!
//! - [`sync`] - Deadline tracking, reusable gate and pause gate
//! - [`broker`] - Broker channel and callback traits, delivery type
//! - [`consumer`] - The two consumer adapters, shared buffer, receive manager
//! - [`receiver`] - Application-facing receive facade
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - [`test_helpers`] - In-memory broker channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pull_bridge::broker::BrokerChannel;
//! use pull_bridge::config::BridgeConfig;
//! use pull_bridge::receiver::MessageReceiver;
//! use pull_bridge::test_helpers::InMemoryBroker;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = Arc::new(InMemoryBroker::new());
//! broker.publish("orders", b"order-1".to_vec());
//!
//! let channel: Arc<dyn BrokerChannel> = broker;
//! let receiver = MessageReceiver::new(channel, "orders", BridgeConfig::default())?;
//! if let Some(delivery) = receiver.receive_timeout(Duration::from_secs(1))? {
//!     println!("received delivery {}", delivery.delivery_tag);
//! }
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod error;
pub mod logging;
pub mod receiver;
pub mod sync;
pub mod test_helpers;

pub use broker::{BrokerChannel, Delivery, DeliveryHandler};
pub use config::{BridgeConfig, ConfigLoader};
pub use constants::AcknowledgeMode;
pub use consumer::{
    ConsumerState, ConsumerStatsSnapshot, DeliveryBuffer, ReceiveConsumer, ReceiveManager,
    SynchronousConsumer,
};
pub use error::{BridgeError, BrokerError, Result};
pub use receiver::MessageReceiver;
pub use sync::{DeadlineTracker, PauseGate, ReusableGate};
