//! Cost functionals
//!
//! - [`CostFunction`]: capability trait for running and terminal costs
//! - [`TargetTrajectories`]: desired state/input references
//! - [`QuadraticCost`]: tracking cost around the targets

pub mod target;
pub mod quadratic;

pub use target::*;
pub use quadratic::*;

use crate::approximation::ScalarFunctionQuadraticApproximation;
use crate::{ModelError, Vector};

/// Running cost `L(t, x, u)` and terminal cost `Φ(t, x)`
///
/// Every call receives the currently installed target trajectories, which
/// may be replaced between solves.
pub trait CostFunction: Send + Sync {
    /// Running cost value
    fn cost(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<f64, ModelError>;

    /// Second-order expansion of the running cost
    ///
    /// Costs without curvature information return
    /// [`ModelError::ApproximationUnavailable`] and provide
    /// [`CostFunction::gradient_approximation`] instead.
    fn quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError>;

    /// Terminal cost value
    fn final_cost(&self, time: f64, state: &Vector, targets: &TargetTrajectories) -> Result<f64, ModelError>;

    /// Second-order expansion of the terminal cost (input terms are empty)
    fn final_cost_quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError>;

    /// First-order expansion of the running cost with zero Hessians
    fn gradient_approximation(
        &self,
        _time: f64,
        _state: &Vector,
        _input: &Vector,
        _targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        Err(ModelError::ApproximationUnavailable {
            what: "running cost gradient",
        })
    }

    /// First-order expansion of the terminal cost with zero Hessian
    fn final_cost_gradient_approximation(
        &self,
        _time: f64,
        _state: &Vector,
        _targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        Err(ModelError::ApproximationUnavailable {
            what: "terminal cost gradient",
        })
    }
}
