//! # hyddp-core
//!
//! Model-side building blocks for trajectory optimization of hybrid
//! (mode-switching) continuous-time systems.
//!
//! ## Modules
//!
//! - [`logic`]: Mode schedules (discrete modes separated by event times)
//! - [`math`]: Numerical integrators and time interpolation
//! - [`approximation`]: Value / linear / quadratic function approximations
//! - [`dynamics`]: System dynamics capability trait and a linear model
//! - [`cost`]: Cost capability trait, target trajectories, quadratic cost
//! - [`constraint`]: Equality constraints, penalty functions, soft constraints
//! - [`control`]: Control laws consumed by the rollout
//! - [`rollout`]: Forward integration of the hybrid dynamics
//! - [`solution`]: Primal solution and performance index snapshots

pub mod logic;
pub mod math;
pub mod approximation;
pub mod dynamics;
pub mod cost;
pub mod constraint;
pub mod control;
pub mod rollout;
pub mod solution;

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Dynamically sized vector type
pub type Vector = DVector<f64>;

/// Dynamically sized matrix type
pub type Matrix = DMatrix<f64>;

/// Errors reported by user-supplied model collaborators
/// (dynamics, cost, constraints).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("dynamics evaluation failed: {0}")]
    DynamicsEvaluationFailed(String),
    #[error("cost evaluation failed: {0}")]
    CostEvaluationFailed(String),
    #[error("constraint evaluation failed: {0}")]
    ConstraintEvaluationFailed(String),
    #[error("{what} approximation is not available")]
    ApproximationUnavailable { what: &'static str },
    #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
}

pub use approximation::{
    ScalarFunctionQuadraticApproximation, VectorFunctionLinearApproximation,
    VectorFunctionQuadraticApproximation,
};
pub use logic::ModeSchedule;
pub use solution::{PerformanceIndex, PrimalSolution};
