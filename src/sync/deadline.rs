//! # Deadline Tracking
//!
//! A fixed expiry instant that is computed once and consulted by every wait
//! that belongs to the same logical operation. Chained waits therefore share
//! one time budget instead of each restarting the clock.

use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Remaining-time tracker against a fixed expiry instant
#[derive(Debug)]
pub struct DeadlineTracker {
    /// Original budget, `None` when unbounded
    timeout: Option<Duration>,
    /// Absolute expiry, `None` when unbounded
    expiry: Option<Instant>,
    /// Latched once the deadline has been observed to pass
    fired: AtomicBool,
}

impl DeadlineTracker {
    /// Track a deadline `timeout` from now. A zero timeout is always expired.
    pub fn new(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::zero();
        }
        match Instant::now().checked_add(timeout) {
            Some(expiry) => Self {
                timeout: Some(timeout),
                expiry: Some(expiry),
                fired: AtomicBool::new(false),
            },
            // Too far in the future to represent
            None => Self::unbounded(),
        }
    }

    /// A tracker that is expired from the moment it is created
    pub fn zero() -> Self {
        Self {
            timeout: Some(Duration::ZERO),
            expiry: Some(Instant::now()),
            fired: AtomicBool::new(true),
        }
    }

    /// A tracker that never expires
    pub fn unbounded() -> Self {
        Self {
            timeout: None,
            expiry: None,
            fired: AtomicBool::new(false),
        }
    }

    /// Build from an optional timeout, `None` meaning unbounded
    pub fn from_optional(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::unbounded, Self::new)
    }

    /// Original budget this tracker was created with
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_unbounded(&self) -> bool {
        self.expiry.is_none()
    }

    /// Time left before expiry, never negative. `Duration::MAX` when unbounded.
    pub fn remaining(&self) -> Duration {
        if self.fired.load(Ordering::Acquire) {
            return Duration::ZERO;
        }
        let Some(expiry) = self.expiry else {
            return Duration::MAX;
        };
        let remaining = expiry.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            self.fired.store(true, Ordering::Release);
        }
        remaining
    }

    /// True once the deadline has passed. Stays true.
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Wait on `condvar` for at most the remaining time.
    ///
    /// Returns `true` when woken before the deadline (notification or spurious
    /// wakeup, callers re-check their condition) and `false` once the deadline
    /// has passed. An expired tracker returns `false` without waiting.
    pub fn wait_on<T: ?Sized>(&self, condvar: &Condvar, guard: &mut MutexGuard<'_, T>) -> bool {
        if self.expired() {
            return false;
        }
        match self.expiry {
            None => {
                condvar.wait(guard);
                true
            }
            Some(expiry) => {
                let result = condvar.wait_until(guard, expiry);
                !result.timed_out() && !self.expired()
            }
        }
    }
}

impl Default for DeadlineTracker {
    fn default() -> Self {
        Self::unbounded()
    }
}
