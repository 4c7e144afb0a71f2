//! System dynamics
//!
//! - Capability trait implemented by user models
//! - Linear time-invariant model (useful for tests and LQ problems)

pub mod system;
pub mod linear;

pub use system::*;
pub use linear::*;
