//! Linear-quadratic approximation of the problem around a nominal rollout

use rayon::prelude::*;
use rayon::ThreadPool;

use hyddp_core::cost::TargetTrajectories;
use hyddp_core::rollout::RolloutTrajectory;
use hyddp_core::{
    Matrix, ModelError, ScalarFunctionQuadraticApproximation, Vector, VectorFunctionLinearApproximation,
};

use crate::config::{Algorithm, DdpSettings};
use crate::problem::OptimalControlProblem;
use crate::riccati::Partition;

/// LQ model of one node, valid only at the point it was computed
///
/// ```text
/// d(dx)/dt = A dx + B du + b
/// cost     ≈ ½ dxᵀQ dx + ½ duᵀR du + duᵀP dx + qᵀdx + rᵀdu
/// 0        = C dx + D du + e
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelData {
    pub time: f64,
    /// `f = b`, `dfdx = A`, `dfdu = B`
    pub dynamics: VectorFunctionLinearApproximation,
    /// Running cost with soft-constraint and state-constraint penalties folded in
    pub cost: ScalarFunctionQuadraticApproximation,
    /// `f = e`, `dfdx = C`, `dfdu = D`
    pub state_input_equality: VectorFunctionLinearApproximation,
    pub state_equality: VectorFunctionLinearApproximation,
    /// Jump map Jacobian when the node is the last sample before an event
    pub jump: Option<Matrix>,
}

impl ModelData {
    pub fn state_dim(&self) -> usize {
        self.dynamics.dfdx.ncols()
    }

    pub fn input_dim(&self) -> usize {
        self.dynamics.dfdu.ncols()
    }
}

/// LQ approximation of a whole trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct LinearQuadraticApproximation {
    /// One model per rollout sample
    pub nodes: Vec<ModelData>,
    /// Terminal cost with the final state constraint penalty folded in
    pub terminal: ScalarFunctionQuadraticApproximation,
}

/// Queries the problem's collaborators at every node of a rollout
pub struct LinearQuadraticApproximator<'a> {
    problem: &'a OptimalControlProblem,
    settings: &'a DdpSettings,
    targets: &'a TargetTrajectories,
}

impl<'a> LinearQuadraticApproximator<'a> {
    pub fn new(problem: &'a OptimalControlProblem, settings: &'a DdpSettings, targets: &'a TargetTrajectories) -> Self {
        Self {
            problem,
            settings,
            targets,
        }
    }

    /// Approximate every node, one task per partition
    pub fn approximate(
        &self,
        pool: &ThreadPool,
        partitions: &[Partition],
        trajectory: &RolloutTrajectory,
    ) -> Result<LinearQuadraticApproximation, ModelError> {
        let chunks = pool.install(|| {
            partitions
                .par_iter()
                .map(|partition| {
                    (partition.begin..partition.end)
                        .map(|k| self.approximate_sample(trajectory, k))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        let nodes: Vec<ModelData> = chunks.into_iter().flatten().collect();

        let last = trajectory.len() - 1;
        let terminal = self.approximate_terminal(trajectory.time[last], &trajectory.state[last])?;
        Ok(LinearQuadraticApproximation { nodes, terminal })
    }

    fn approximate_sample(&self, trajectory: &RolloutTrajectory, k: usize) -> Result<ModelData, ModelError> {
        self.approximate_node(
            trajectory.time[k],
            &trajectory.state[k],
            &trajectory.input[k],
            trajectory.is_pre_event(k),
        )
    }

    /// LQ model at a single `(t, x, u)`
    pub fn approximate_node(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
        pre_event: bool,
    ) -> Result<ModelData, ModelError> {
        let problem = self.problem;

        let mut dynamics = problem.dynamics.linear_approximation(time, state, input)?;
        // Flow residual vanishes on a rolled-out nominal
        dynamics.f = Vector::zeros(dynamics.f.len());

        let mut cost = match problem.cost.quadratic_approximation(time, state, input, self.targets) {
            Err(ModelError::ApproximationUnavailable { .. }) => {
                problem.cost.gradient_approximation(time, state, input, self.targets)?
            }
            cost => cost?,
        };
        for soft in &problem.soft_constraints {
            let penalty = match self.settings.algorithm {
                Algorithm::Slq => soft.quadratic_approximation(time, state, input)?,
                Algorithm::Ilqr => soft.gauss_newton_approximation(time, state, input)?,
            };
            cost += &penalty;
        }

        let state_equality = problem.state_equality_constraint_linear_approximation(time, state)?;
        add_state_penalty(&mut cost, &state_equality, self.settings.state_constraint_penalty_coeff);

        let state_input_equality = problem.equality_constraint_linear_approximation(time, state, input)?;

        let jump = if pre_event {
            Some(problem.dynamics.jump_map_linear_approximation(time, state)?.dfdx)
        } else {
            None
        };

        Ok(ModelData {
            time,
            dynamics,
            cost,
            state_input_equality,
            state_equality,
            jump,
        })
    }

    /// Terminal cost expansion at `(tf, x_f)`
    pub fn approximate_terminal(
        &self,
        time: f64,
        state: &Vector,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let cost = &self.problem.cost;
        let mut terminal = match cost.final_cost_quadratic_approximation(time, state, self.targets) {
            Err(ModelError::ApproximationUnavailable { .. }) => {
                cost.final_cost_gradient_approximation(time, state, self.targets)?
            }
            terminal => terminal?,
        };
        let constraint = self.problem.final_state_constraint_linear_approximation(time, state)?;
        add_state_penalty(&mut terminal, &constraint, self.settings.state_constraint_penalty_coeff);
        Ok(terminal)
    }
}

/// Fold `½ μ ‖h(x)‖²` into a cost expansion (Gauss-Newton)
fn add_state_penalty(
    cost: &mut ScalarFunctionQuadraticApproximation,
    constraint: &VectorFunctionLinearApproximation,
    coefficient: f64,
) {
    if constraint.rows() == 0 || coefficient == 0.0 {
        return;
    }
    let h = &constraint.f;
    let c = &constraint.dfdx;
    cost.f += 0.5 * coefficient * h.dot(h);
    cost.dfdx += c.transpose() * h * coefficient;
    cost.dfdxx += c.transpose() * c * coefficient;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use hyddp_core::constraint::{
        ConstraintOrder, LinearStateConstraint, MultidimensionalPenalty, QuadraticPenalty, StateInputSoftConstraint,
        LinearStateInputConstraint,
    };
    use hyddp_core::cost::{CostFunction, QuadraticCost};
    use hyddp_core::dynamics::LinearSystemDynamics;

    fn problem() -> OptimalControlProblem {
        let dynamics = LinearSystemDynamics::new(
            Matrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            Matrix::from_row_slice(2, 1, &[0.0, 1.0]),
        );
        let cost = QuadraticCost::new(Matrix::identity(2, 2), Matrix::identity(1, 1), Matrix::identity(2, 2) * 2.0);
        OptimalControlProblem::new(Arc::new(dynamics), Arc::new(cost))
    }

    #[test]
    fn test_flow_residual_is_zero() {
        let p = problem();
        let settings = DdpSettings::default();
        let targets = TargetTrajectories::default();
        let approximator = LinearQuadraticApproximator::new(&p, &settings, &targets);
        let node = approximator
            .approximate_node(0.0, &Vector::from_vec(vec![1.0, 1.0]), &Vector::from_vec(vec![1.0]), false)
            .unwrap();
        assert_eq!(node.dynamics.f, Vector::zeros(2));
        assert_eq!(node.dynamics.dfdu, Matrix::from_row_slice(2, 1, &[0.0, 1.0]));
        assert!(node.jump.is_none());
        assert_eq!(node.state_input_equality.rows(), 0);
    }

    #[test]
    fn test_soft_constraint_folded_into_cost() {
        let con = LinearStateInputConstraint::new(
            Matrix::zeros(1, 2),
            Matrix::from_row_slice(1, 1, &[1.0]),
            Vector::zeros(1),
        );
        let soft = StateInputSoftConstraint::new(
            Arc::new(con),
            MultidimensionalPenalty::shared(Arc::new(QuadraticPenalty::new(3.0))),
            ConstraintOrder::Linear,
        );
        let p = problem().with_soft_constraint(soft);
        let settings = DdpSettings::default();
        let targets = TargetTrajectories::default();
        let approximator = LinearQuadraticApproximator::new(&p, &settings, &targets);
        let node = approximator
            .approximate_node(0.0, &Vector::zeros(2), &Vector::from_vec(vec![2.0]), false)
            .unwrap();
        // R = 1 from the cost, 3 from the penalty
        assert_relative_eq!(node.cost.dfduu[(0, 0)], 4.0);
        // r = 2 + 3·2
        assert_relative_eq!(node.cost.dfdu[0], 8.0);
    }

    #[test]
    fn test_terminal_includes_final_constraint_penalty() {
        let p = problem().with_final_state_constraint(Arc::new(LinearStateConstraint::new(
            Matrix::from_row_slice(1, 2, &[1.0, 0.0]),
            Vector::from_vec(vec![-1.0]),
        )));
        let settings = DdpSettings {
            state_constraint_penalty_coeff: 10.0,
            ..Default::default()
        };
        let targets = TargetTrajectories::default();
        let approximator = LinearQuadraticApproximator::new(&p, &settings, &targets);
        let terminal = approximator.approximate_terminal(1.0, &Vector::zeros(2)).unwrap();
        assert_relative_eq!(terminal.dfdxx[(0, 0)], 12.0);
        assert_relative_eq!(terminal.dfdx[0], -10.0);
        assert_relative_eq!(terminal.f, 5.0);
    }

    /// `L = wᵀx + u`, `Φ = wᵀx`, expanded to first order only
    struct LinearCost {
        weights: Vector,
    }

    impl CostFunction for LinearCost {
        fn cost(
            &self,
            _time: f64,
            state: &Vector,
            input: &Vector,
            _targets: &TargetTrajectories,
        ) -> Result<f64, ModelError> {
            Ok(self.weights.dot(state) + input.sum())
        }

        fn quadratic_approximation(
            &self,
            _time: f64,
            _state: &Vector,
            _input: &Vector,
            _targets: &TargetTrajectories,
        ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
            Err(ModelError::ApproximationUnavailable { what: "linear cost" })
        }

        fn gradient_approximation(
            &self,
            time: f64,
            state: &Vector,
            input: &Vector,
            targets: &TargetTrajectories,
        ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
            let mut approx = ScalarFunctionQuadraticApproximation::zero(state.len(), input.len());
            approx.f = self.cost(time, state, input, targets)?;
            approx.dfdx = self.weights.clone();
            approx.dfdu = Vector::from_element(input.len(), 1.0);
            Ok(approx)
        }

        fn final_cost(&self, _time: f64, state: &Vector, _targets: &TargetTrajectories) -> Result<f64, ModelError> {
            Ok(self.weights.dot(state))
        }

        fn final_cost_quadratic_approximation(
            &self,
            _time: f64,
            _state: &Vector,
            _targets: &TargetTrajectories,
        ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
            Err(ModelError::ApproximationUnavailable { what: "linear cost" })
        }

        fn final_cost_gradient_approximation(
            &self,
            time: f64,
            state: &Vector,
            targets: &TargetTrajectories,
        ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
            let mut approx = ScalarFunctionQuadraticApproximation::zero(state.len(), 0);
            approx.f = self.final_cost(time, state, targets)?;
            approx.dfdx = self.weights.clone();
            Ok(approx)
        }
    }

    #[test]
    fn test_cost_without_curvature_uses_gradient() {
        let dynamics = LinearSystemDynamics::new(Matrix::zeros(2, 2), Matrix::from_row_slice(2, 1, &[0.0, 1.0]));
        let cost = LinearCost {
            weights: Vector::from_vec(vec![2.0, -1.0]),
        };
        let p = OptimalControlProblem::new(Arc::new(dynamics), Arc::new(cost));
        let settings = DdpSettings::default();
        let targets = TargetTrajectories::default();
        let approximator = LinearQuadraticApproximator::new(&p, &settings, &targets);
        let x = Vector::from_vec(vec![1.0, 1.0]);

        let node = approximator
            .approximate_node(0.0, &x, &Vector::from_vec(vec![3.0]), false)
            .unwrap();
        assert_relative_eq!(node.cost.f, 4.0);
        assert_eq!(node.cost.dfdx, Vector::from_vec(vec![2.0, -1.0]));
        assert_eq!(node.cost.dfdu, Vector::from_vec(vec![1.0]));
        assert_eq!(node.cost.dfdxx, Matrix::zeros(2, 2));
        assert_eq!(node.cost.dfduu, Matrix::zeros(1, 1));

        let terminal = approximator.approximate_terminal(1.0, &x).unwrap();
        assert_relative_eq!(terminal.f, 1.0);
        assert_eq!(terminal.dfdx, Vector::from_vec(vec![2.0, -1.0]));
        assert_eq!(terminal.dfdxx, Matrix::zeros(2, 2));
    }
}
