//! Soft constraints
//!
//! A state-input constraint relaxed into the cost through a penalty. The
//! approximation is composed from the constraint's own derivatives and the
//! penalty's derivatives; Jacobians are never recomputed here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::approximation::ScalarFunctionQuadraticApproximation;
use crate::constraint::{MultidimensionalPenalty, StateInputConstraint};
use crate::{ModelError, Vector};

/// Order of the constraint approximation used for the penalty curvature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintOrder {
    Linear,
    Quadratic,
}

/// Penalized state-input constraint
#[derive(Clone)]
pub struct StateInputSoftConstraint {
    constraint: Arc<dyn StateInputConstraint>,
    penalty: MultidimensionalPenalty,
    order: ConstraintOrder,
}

impl StateInputSoftConstraint {
    pub fn new(constraint: Arc<dyn StateInputConstraint>, penalty: MultidimensionalPenalty, order: ConstraintOrder) -> Self {
        Self {
            constraint,
            penalty,
            order,
        }
    }

    pub fn order(&self) -> ConstraintOrder {
        self.order
    }

    /// Penalty value at `(t, x, u)`
    pub fn value(&self, time: f64, state: &Vector, input: &Vector) -> Result<f64, ModelError> {
        let h = self.constraint.value(time, state, input)?;
        self.penalty.value(&h)
    }

    /// Penalty expansion at the preferred order
    ///
    /// A quadratic-order constraint without curvature information degrades
    /// to the Gauss-Newton expansion.
    pub fn quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        match self.order {
            ConstraintOrder::Linear => self.gauss_newton_approximation(time, state, input),
            ConstraintOrder::Quadratic => match self.constraint.quadratic_approximation(time, state, input) {
                Ok(h) => self.penalty.quadratic_composition(&h),
                Err(ModelError::ApproximationUnavailable { .. }) => {
                    self.gauss_newton_approximation(time, state, input)
                }
                Err(e) => Err(e),
            },
        }
    }

    /// Penalty expansion from the constraint linearization only
    pub fn gauss_newton_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let h = self.constraint.linear_approximation(time, state, input)?;
        self.penalty.linear_composition(&h)
    }
}

impl std::fmt::Debug for StateInputSoftConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateInputSoftConstraint")
            .field("penalty", &self.penalty)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
