//! # Receive Manager
//!
//! Flow control for receive calls. A [`PauseGate`] holds new receives back
//! while delivery is suspended, and a [`ReusableGate`] counts the receives
//! already in flight so a caller pausing delivery can wait for them to clear.

use std::time::Duration;
use tracing::{debug, info};

use crate::constants::events;
use crate::sync::{DeadlineTracker, PauseGate, ReusableGate};

/// Admission control for receive calls
#[derive(Debug, Default)]
pub struct ReceiveManager {
    gate: PauseGate,
    in_flight: ReusableGate,
}

impl ReceiveManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager whose gate starts paused
    pub fn paused() -> Self {
        Self {
            gate: PauseGate::new(true),
            in_flight: ReusableGate::new(0),
        }
    }

    /// Admit a receive once the gate is running, within the deadline.
    ///
    /// Returns `None` if the gate stayed paused until the deadline.
    pub fn enter(&self, deadline: &DeadlineTracker) -> Option<ReceiveGuard<'_>> {
        loop {
            if !self.gate.await_running_until(deadline) {
                debug!("Receive not admitted before deadline");
                return None;
            }
            self.in_flight.up();
            if !self.gate.is_paused() {
                return Some(ReceiveGuard { manager: self });
            }
            // Paused between the wait and the count; back out and wait again
            self.in_flight.down();
        }
    }

    fn exit(&self) {
        self.in_flight.down();
    }

    /// Hold back new receives. Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        let paused = self.gate.pause();
        if paused {
            info!(
                event = events::RECEIVER_PAUSED,
                in_flight = self.in_flight.count(),
                "Receives paused"
            );
        }
        paused
    }

    /// Admit receives again. Returns `false` if already running.
    pub fn resume(&self) -> bool {
        let resumed = self.gate.resume();
        if resumed {
            info!(event = events::RECEIVER_RESUMED, "Receives resumed");
        }
        resumed
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Number of receives currently admitted
    pub fn in_flight(&self) -> i64 {
        self.in_flight.count()
    }

    /// Wait up to `timeout` for all admitted receives to finish
    pub fn wait_to_clear(&self, timeout: Duration) -> bool {
        self.in_flight.await_zero(timeout)
    }
}

/// Marks one admitted receive; leaving scope releases it
#[derive(Debug)]
#[must_use = "dropping the guard ends the receive immediately"]
pub struct ReceiveGuard<'a> {
    manager: &'a ReceiveManager,
}

impl Drop for ReceiveGuard<'_> {
    fn drop(&mut self) {
        self.manager.exit();
    }
}
