//! Dynamics capability trait
//!
//! The solver depends only on this interface:
//!
//! ```text
//! ẋ = f(t, x, u)            (flow map, per mode)
//! x⁺ = g(t, x⁻)             (jump map, applied at event times)
//! ```

use crate::approximation::VectorFunctionLinearApproximation;
use crate::{Matrix, ModelError, Vector};

/// Continuous-time (hybrid) system dynamics
///
/// Implementations must be thread-safe: the solver evaluates the model
/// concurrently from several partitions and line-search trials.
pub trait SystemDynamics: Send + Sync {
    /// State dimension
    fn state_dim(&self) -> usize;

    /// Input dimension
    fn input_dim(&self) -> usize;

    /// Flow map `ẋ = f(t, x, u)`
    fn flow_map(&self, time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError>;

    /// Linearization `(f, ∂f/∂x, ∂f/∂u)` of the flow map
    fn linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError>;

    /// Jump map applied at an event time (identity by default)
    fn jump_map(&self, _time: f64, state: &Vector) -> Result<Vector, ModelError> {
        Ok(state.clone())
    }

    /// Linearization of the jump map (identity by default)
    ///
    /// `dfdu` has zero columns; only `f` and `dfdx` are meaningful.
    fn jump_map_linear_approximation(
        &self,
        time: f64,
        state: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        let nx = state.len();
        Ok(VectorFunctionLinearApproximation {
            f: self.jump_map(time, state)?,
            dfdx: Matrix::identity(nx, nx),
            dfdu: Matrix::zeros(nx, 0),
        })
    }
}
