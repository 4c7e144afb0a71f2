//! Mathematical utilities
//!
//! Numerical integrators and interpolation of time-stamped samples.

pub mod integrator;
pub mod interpolation;

pub use integrator::*;
pub use interpolation::*;
