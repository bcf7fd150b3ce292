#![allow(dead_code)]

pub mod strategies;

use pull_bridge::broker::BrokerChannel;
use pull_bridge::test_helpers::InMemoryBroker;
use std::sync::Arc;
use tracing::Level;

pub use strategies::*;

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A fresh in-memory broker plus the trait-object view consumers expect
pub fn broker_and_channel() -> (Arc<InMemoryBroker>, Arc<dyn BrokerChannel>) {
    let broker = Arc::new(InMemoryBroker::new());
    let channel: Arc<dyn BrokerChannel> = Arc::clone(&broker) as Arc<dyn BrokerChannel>;
    (broker, channel)
}
