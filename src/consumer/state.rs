//! # Consumer Lifecycle
//!
//! `Active -> CancelRequested -> Cancelled`, shared by both consumers together
//! with the idempotent cancel path.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Consumer lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    /// Subscribed and accepting deliveries
    Active = 0,
    /// Cancel requested, broker confirmation outstanding
    CancelRequested = 1,
    /// Broker confirmed the cancel
    Cancelled = 2,
}

impl From<u8> for ConsumerState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConsumerState::Active,
            1 => ConsumerState::CancelRequested,
            _ => ConsumerState::Cancelled,
        }
    }
}

#[derive(Debug, Default)]
struct TagBinding {
    consumer_tag: Option<String>,
    cancel_issued: bool,
}

/// Tracks lifecycle state and decides when a broker cancel must be issued.
///
/// The cancel request is issued at most once per successful attempt. A cancel
/// requested before the consumer tag is known is deferred until
/// [`CancelSwitch::bind`] supplies it.
#[derive(Debug, Default)]
pub struct CancelSwitch {
    state: AtomicU8,
    binding: Mutex<TagBinding>,
}

impl CancelSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConsumerState {
        ConsumerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn consumer_tag(&self) -> Option<String> {
        self.binding.lock().consumer_tag.clone()
    }

    /// States only move forward. Returns the previous state.
    fn advance(&self, target: ConsumerState) -> ConsumerState {
        ConsumerState::from(self.state.fetch_max(target as u8, Ordering::AcqRel))
    }

    /// Record the consumer tag. Returns the tag when a deferred cancel must now be issued.
    pub fn bind(&self, consumer_tag: &str) -> Option<String> {
        let mut binding = self.binding.lock();
        binding.consumer_tag = Some(consumer_tag.to_string());
        if self.state() == ConsumerState::CancelRequested && !binding.cancel_issued {
            binding.cancel_issued = true;
            return Some(consumer_tag.to_string());
        }
        None
    }

    /// Move to `CancelRequested`. Returns the tag to cancel when the broker
    /// request should be issued now, `None` when already issued or deferred.
    pub fn request(&self) -> Option<String> {
        let mut binding = self.binding.lock();
        self.advance(ConsumerState::CancelRequested);
        if binding.cancel_issued || self.state() == ConsumerState::Cancelled {
            return None;
        }
        let tag = binding.consumer_tag.clone()?;
        binding.cancel_issued = true;
        Some(tag)
    }

    /// The broker rejected the cancel request; allow another attempt
    pub fn rearm(&self) {
        self.binding.lock().cancel_issued = false;
    }

    /// Move to `Cancelled`. Returns `false` for a duplicate confirmation.
    pub fn confirm(&self) -> bool {
        self.advance(ConsumerState::Cancelled) != ConsumerState::Cancelled
    }
}
