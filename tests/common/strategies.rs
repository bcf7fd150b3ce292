use proptest::prelude::*;

/// A step applied to a reusable gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStep {
    Up,
    Down,
}

/// Strategy for generating up/down sequences
pub fn gate_steps_strategy() -> impl Strategy<Value = Vec<GateStep>> {
    prop::collection::vec(prop_oneof![Just(GateStep::Up), Just(GateStep::Down)], 0..64)
}

/// Strategy for generating (capacity, overflow) pairs for buffered consumers
pub fn capacity_and_overflow_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..=32, 0usize..=32)
}
