//! # Synchronization Primitives
//!
//! Blocking primitives the consumers and the receive manager are built on:
//!
//! - [`DeadlineTracker`]: one time budget shared by chained waits
//! - [`ReusableGate`]: count-up/count-down latch released at zero
//! - [`PauseGate`]: paused/running gate

pub mod deadline;
pub mod pause_gate;
pub mod reusable_gate;

pub use deadline::DeadlineTracker;
pub use pause_gate::PauseGate;
pub use reusable_gate::ReusableGate;
