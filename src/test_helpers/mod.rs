// Test Helpers Module - Consumer Testing Infrastructure
//
// Provides an in-process broker channel so consumers, the receive manager and
// the receiver facade can be exercised without a running broker.

pub mod in_memory_broker;

pub use in_memory_broker::{InMemoryBroker, NackRecord};
