//! # Pause Gate
//!
//! Binary paused/running gate. Waiters block only while the gate is paused.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tracing::debug;

use super::DeadlineTracker;

#[derive(Debug, Default)]
struct PauseState {
    paused: bool,
    /// Bumped on every resume
    resumes: u64,
}

/// Gate that suspends callers while paused
#[derive(Debug, Default)]
pub struct PauseGate {
    state: Mutex<PauseState>,
    running: Condvar,
}

impl PauseGate {
    /// Create a gate, initially paused or running
    pub fn new(paused: bool) -> Self {
        Self {
            state: Mutex::new(PauseState { paused, resumes: 0 }),
            running: Condvar::new(),
        }
    }

    /// Flip to paused. Returns `false` if the gate was already paused.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.paused {
            return false;
        }
        state.paused = true;
        debug!("Pause gate closed");
        true
    }

    /// Flip to running and release waiters. Returns `false` if already running.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if !state.paused {
            return false;
        }
        state.paused = false;
        state.resumes = state.resumes.wrapping_add(1);
        drop(state);
        self.running.notify_all();
        debug!("Pause gate opened");
        true
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Wait up to `timeout` for the gate to be running
    pub fn await_running(&self, timeout: Duration) -> bool {
        self.await_running_until(&DeadlineTracker::new(timeout))
    }

    /// Wait for the gate to be running within the tracker's remaining time.
    ///
    /// Returns `true` if the gate is running on return, or was resumed while
    /// this caller was waiting.
    pub fn await_running_until(&self, deadline: &DeadlineTracker) -> bool {
        let mut state = self.state.lock();
        let resumes = state.resumes;
        while state.paused && state.resumes == resumes {
            if !deadline.wait_on(&self.running, &mut state) {
                break;
            }
        }
        !state.paused || state.resumes != resumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_pause_and_resume_report_transitions() {
        let gate = PauseGate::default();
        assert!(!gate.is_paused());
        assert!(!gate.resume());

        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(gate.is_paused());

        assert!(gate.resume());
        assert!(!gate.resume());
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_running_gate_does_not_block() {
        let gate = PauseGate::new(false);
        let start = Instant::now();
        assert!(gate.await_running(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_paused_gate_times_out() {
        let gate = PauseGate::new(true);
        let start = Instant::now();
        assert!(!gate.await_running(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!gate.await_running(Duration::ZERO));
    }

    #[test]
    fn test_resume_mid_wait_releases_before_timeout() {
        let gate = Arc::new(PauseGate::new(true));
        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let start = Instant::now();
                let opened = gate.await_running(Duration::from_secs(5));
                (opened, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(gate.resume());

        let (opened, elapsed) = waiter.join().unwrap();
        assert!(opened);
        assert!(elapsed < Duration::from_secs(1));
    }
}
