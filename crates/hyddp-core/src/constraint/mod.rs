//! Constraints
//!
//! - Equality constraint capability traits (state-input and state-only)
//! - Linear constraints
//! - Penalty functions and soft constraints built from them

pub mod linear;
pub mod penalty;
pub mod soft;

pub use linear::*;
pub use penalty::*;
pub use soft::*;

use crate::approximation::{VectorFunctionLinearApproximation, VectorFunctionQuadraticApproximation};
use crate::{ModelError, Vector};

/// State-input constraint `h(t, x, u)`
///
/// Used as an equality `h = 0` by the solver, or as `h >= 0` when wrapped
/// in a [`StateInputSoftConstraint`].
pub trait StateInputConstraint: Send + Sync {
    /// Number of constraint rows at `time`
    fn num_constraints(&self, time: f64) -> usize;

    fn value(&self, time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError>;

    fn linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError>;

    /// Curvature is optional; callers fall back to Gauss-Newton
    fn quadratic_approximation(
        &self,
        _time: f64,
        _state: &Vector,
        _input: &Vector,
    ) -> Result<VectorFunctionQuadraticApproximation, ModelError> {
        Err(ModelError::ApproximationUnavailable {
            what: "state-input constraint quadratic",
        })
    }
}

/// State-only constraint `h(t, x)`
///
/// Approximations carry an input Jacobian with zero columns.
pub trait StateConstraint: Send + Sync {
    fn num_constraints(&self, time: f64) -> usize;

    fn value(&self, time: f64, state: &Vector) -> Result<Vector, ModelError>;

    fn linear_approximation(&self, time: f64, state: &Vector) -> Result<VectorFunctionLinearApproximation, ModelError>;
}
