//! # Consumer Statistics and Failure Log
//!
//! Atomic counters for delivery decisions, plus the side channel that carries
//! broker failures raised on the delivery thread back to application code.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BridgeError;

/// Failures retained per consumer before the oldest are discarded
pub const FAILURE_LOG_CAPACITY: usize = 64;

/// Point-in-time view of a consumer's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    /// Deliveries handed off or buffered
    pub accepted: u64,
    /// Deliveries negatively acknowledged with requeue
    pub rejected: u64,
    /// Deliveries that arrived after the cancel was confirmed
    pub stragglers: u64,
    /// Broker calls that failed
    pub broker_failures: u64,
}

/// Delivery decision counters
#[derive(Debug, Default)]
pub struct ConsumerStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    stragglers: AtomicU64,
    broker_failures: AtomicU64,
}

impl ConsumerStats {
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_straggler(&self) {
        self.stragglers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broker_failure(&self) {
        self.broker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            stragglers: self.stragglers.load(Ordering::Relaxed),
            broker_failures: self.broker_failures.load(Ordering::Relaxed),
        }
    }
}

/// Bounded record of failures raised where they cannot be returned
#[derive(Debug, Default)]
pub struct FailureLog {
    entries: Mutex<VecDeque<BridgeError>>,
}

impl FailureLog {
    pub fn record(&self, error: BridgeError) {
        let mut entries = self.entries.lock();
        if entries.len() == FAILURE_LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(error);
    }

    /// Remove and return everything recorded so far, oldest first
    pub fn take(&self) -> Vec<BridgeError> {
        self.entries.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
