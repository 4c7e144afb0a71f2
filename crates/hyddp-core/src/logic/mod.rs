//! Hybrid-system logic
//!
//! Discrete mode sequences and the event times separating them.

pub mod mode_schedule;

pub use mode_schedule::*;
