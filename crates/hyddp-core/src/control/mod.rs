//! Control laws
//!
//! Policies evaluated by the rollout: `u = π(t, x)`.

pub mod controller;

pub use controller::*;

use crate::Vector;

/// Time-varying state feedback policy
pub trait Controller: Send + Sync {
    fn compute_input(&self, time: f64, state: &Vector) -> Vector;
}
