//! Optimal control problem definition
//!
//! ```text
//! minimize    ∫ L(t, x, u) dt + Φ(x(tf))
//! subject to  ẋ = f(t, x, u),  x⁺ = g(t, x⁻) at events
//!             C x + D u + e = 0          (state-input equality)
//!             h(t, x) = 0                (state-only equality, penalized)
//!             h_f(x(tf)) = 0             (final state equality, penalized)
//!             p(h_s(t, x, u))            (soft constraints, in the cost)
//! ```

use std::sync::Arc;

use hyddp_core::constraint::{StateConstraint, StateInputConstraint, StateInputSoftConstraint};
use hyddp_core::cost::CostFunction;
use hyddp_core::dynamics::SystemDynamics;
use hyddp_core::{ModelError, Vector, VectorFunctionLinearApproximation};

/// Collaborators of one optimal control problem
#[derive(Clone)]
pub struct OptimalControlProblem {
    pub dynamics: Arc<dyn SystemDynamics>,
    pub cost: Arc<dyn CostFunction>,
    pub equality_constraints: Vec<Arc<dyn StateInputConstraint>>,
    pub state_equality_constraints: Vec<Arc<dyn StateConstraint>>,
    pub final_state_equality_constraints: Vec<Arc<dyn StateConstraint>>,
    pub soft_constraints: Vec<StateInputSoftConstraint>,
    /// Input of the initial open-loop rollout
    pub operating_input: Vector,
}

impl OptimalControlProblem {
    /// Unconstrained problem with a zero operating input
    pub fn new(dynamics: Arc<dyn SystemDynamics>, cost: Arc<dyn CostFunction>) -> Self {
        let nu = dynamics.input_dim();
        Self {
            dynamics,
            cost,
            equality_constraints: Vec::new(),
            state_equality_constraints: Vec::new(),
            final_state_equality_constraints: Vec::new(),
            soft_constraints: Vec::new(),
            operating_input: Vector::zeros(nu),
        }
    }

    pub fn with_equality_constraint(mut self, constraint: Arc<dyn StateInputConstraint>) -> Self {
        self.equality_constraints.push(constraint);
        self
    }

    pub fn with_state_equality_constraint(mut self, constraint: Arc<dyn StateConstraint>) -> Self {
        self.state_equality_constraints.push(constraint);
        self
    }

    pub fn with_final_state_constraint(mut self, constraint: Arc<dyn StateConstraint>) -> Self {
        self.final_state_equality_constraints.push(constraint);
        self
    }

    pub fn with_soft_constraint(mut self, constraint: StateInputSoftConstraint) -> Self {
        self.soft_constraints.push(constraint);
        self
    }

    pub fn with_operating_input(mut self, input: Vector) -> Self {
        self.operating_input = input;
        self
    }

    pub fn state_dim(&self) -> usize {
        self.dynamics.state_dim()
    }

    pub fn input_dim(&self) -> usize {
        self.dynamics.input_dim()
    }

    /// Stacked state-input equality values
    pub fn equality_constraint_value(&self, time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError> {
        let values = self
            .equality_constraints
            .iter()
            .map(|c| c.value(time, state, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stack_vectors(&values))
    }

    /// Stacked state-input equality linearization (zero rows without constraints)
    pub fn equality_constraint_linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        let parts = self
            .equality_constraints
            .iter()
            .map(|c| c.linear_approximation(time, state, input))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stack_linear(&parts, state.len(), input.len()))
    }

    pub fn state_equality_constraint_value(&self, time: f64, state: &Vector) -> Result<Vector, ModelError> {
        stacked_state_value(&self.state_equality_constraints, time, state)
    }

    pub fn state_equality_constraint_linear_approximation(
        &self,
        time: f64,
        state: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        stacked_state_linear(&self.state_equality_constraints, time, state)
    }

    pub fn final_state_constraint_value(&self, time: f64, state: &Vector) -> Result<Vector, ModelError> {
        stacked_state_value(&self.final_state_equality_constraints, time, state)
    }

    pub fn final_state_constraint_linear_approximation(
        &self,
        time: f64,
        state: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        stacked_state_linear(&self.final_state_equality_constraints, time, state)
    }

    /// Sum of all soft-constraint penalties
    pub fn soft_constraint_penalty(&self, time: f64, state: &Vector, input: &Vector) -> Result<f64, ModelError> {
        self.soft_constraints
            .iter()
            .map(|c| c.value(time, state, input))
            .sum()
    }
}

fn stacked_state_value(
    constraints: &[Arc<dyn StateConstraint>],
    time: f64,
    state: &Vector,
) -> Result<Vector, ModelError> {
    let values = constraints
        .iter()
        .map(|c| c.value(time, state))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stack_vectors(&values))
}

fn stacked_state_linear(
    constraints: &[Arc<dyn StateConstraint>],
    time: f64,
    state: &Vector,
) -> Result<VectorFunctionLinearApproximation, ModelError> {
    let parts = constraints
        .iter()
        .map(|c| c.linear_approximation(time, state))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(stack_linear(&parts, state.len(), 0))
}

fn stack_vectors(values: &[Vector]) -> Vector {
    let rows = values.iter().map(|v| v.len()).sum();
    let mut stacked = Vector::zeros(rows);
    let mut offset = 0;
    for v in values {
        stacked.rows_mut(offset, v.len()).copy_from(v);
        offset += v.len();
    }
    stacked
}

fn stack_linear(parts: &[VectorFunctionLinearApproximation], nx: usize, nu: usize) -> VectorFunctionLinearApproximation {
    let rows = parts.iter().map(|p| p.rows()).sum();
    let mut stacked = VectorFunctionLinearApproximation::zero(rows, nx, nu);
    let mut offset = 0;
    for part in parts {
        let n = part.rows();
        stacked.f.rows_mut(offset, n).copy_from(&part.f);
        stacked.dfdx.view_mut((offset, 0), (n, nx)).copy_from(&part.dfdx);
        if nu > 0 {
            stacked.dfdu.view_mut((offset, 0), (n, nu)).copy_from(&part.dfdu);
        }
        offset += n;
    }
    stacked
}
