//! # Reusable Gate
//!
//! A counting barrier that can move in both directions. Callers wait until the
//! count reaches zero; unlike a one-shot latch the count may leave zero again
//! and come back any number of times, and may go negative when completions
//! outrun starts.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;

use super::DeadlineTracker;

#[derive(Debug, Default)]
struct GateState {
    count: i64,
    /// Bumped on every transition to zero
    releases: u64,
}

/// Count-up/count-down latch whose waiters are released at zero
#[derive(Debug, Default)]
pub struct ReusableGate {
    state: Mutex<GateState>,
    zero: Condvar,
}

impl ReusableGate {
    /// Create a gate starting at `initial`
    pub fn new(initial: i64) -> Self {
        Self {
            state: Mutex::new(GateState {
                count: initial,
                releases: 0,
            }),
            zero: Condvar::new(),
        }
    }

    /// Increment the count and return the new value
    pub fn up(&self) -> i64 {
        self.adjust(1)
    }

    /// Decrement the count and return the new value
    pub fn down(&self) -> i64 {
        self.adjust(-1)
    }

    pub fn count(&self) -> i64 {
        self.state.lock().count
    }

    fn adjust(&self, delta: i64) -> i64 {
        let mut state = self.state.lock();
        state.count += delta;
        let count = state.count;
        if count == 0 {
            state.releases = state.releases.wrapping_add(1);
            drop(state);
            let woken = self.zero.notify_all();
            trace!(woken = woken, "Reusable gate reached zero");
        }
        count
    }

    /// Wait up to `timeout` for the count to reach zero
    pub fn await_zero(&self, timeout: Duration) -> bool {
        self.await_zero_until(&DeadlineTracker::new(timeout))
    }

    /// Wait for the count to reach zero within the tracker's remaining time.
    ///
    /// Returns `true` if the count is zero on return, or passed through zero
    /// while this caller was waiting.
    pub fn await_zero_until(&self, deadline: &DeadlineTracker) -> bool {
        let mut state = self.state.lock();
        let releases = state.releases;
        while state.count != 0 && state.releases == releases {
            if !deadline.wait_on(&self.zero, &mut state) {
                break;
            }
        }
        state.count == 0 || state.releases != releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_await_at_zero_returns_immediately() {
        let gate = ReusableGate::new(0);
        let start = Instant::now();
        assert!(gate.await_zero(Duration::from_secs(5)));
        assert!(gate.await_zero(Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_await_times_out_above_zero() {
        let gate = ReusableGate::new(2);
        let start = Instant::now();
        assert!(!gate.await_zero(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(gate.count(), 2);
    }

    #[test]
    fn test_down_to_zero_releases_waiters() {
        let gate = Arc::new(ReusableGate::new(2));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.await_zero(Duration::from_secs(5)))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        assert_eq!(gate.down(), 1);
        assert_eq!(gate.down(), 0);

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_gate_cycles_without_residual_state() {
        let gate = Arc::new(ReusableGate::new(1));
        gate.down();
        assert!(gate.await_zero(Duration::ZERO));

        assert_eq!(gate.up(), 1);
        assert!(!gate.await_zero(Duration::from_millis(10)));

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.await_zero(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(gate.down(), 0);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_released_waiter_not_failed_by_later_up() {
        let gate = Arc::new(ReusableGate::new(1));
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || gate.await_zero(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));

        // Pass through zero and straight back up
        gate.down();
        gate.up();

        assert!(waiter.join().unwrap());
        assert_eq!(gate.count(), 1);
    }

    #[test]
    fn test_negative_counts_are_permitted() {
        let gate = ReusableGate::new(0);
        assert_eq!(gate.down(), -1);
        assert!(!gate.await_zero(Duration::from_millis(10)));
        assert_eq!(gate.up(), 0);
        assert!(gate.await_zero(Duration::ZERO));
    }
}
