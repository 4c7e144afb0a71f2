//! Merit evaluation of a rollout
//!
//! ```text
//! cost  = ∫ L dt + Φ(x_f)                               (trapezoid rule)
//! merit = cost + ∫ Σ p(h_s) dt
//!       + ½ μ_c ∫ ‖g(t, x, u)‖² dt
//!       + ½ μ_s (∫ ‖h(t, x)‖² dt + ‖h_f(x_f)‖²)
//! ```

use hyddp_core::cost::TargetTrajectories;
use hyddp_core::rollout::RolloutTrajectory;
use hyddp_core::{ModelError, PerformanceIndex};

use crate::config::DdpSettings;
use crate::problem::OptimalControlProblem;

/// Integrands of one sample
#[derive(Debug, Clone, Copy, Default)]
struct SampleMetrics {
    cost: f64,
    state_input_eq: f64,
    state_eq: f64,
    penalty: f64,
}

/// Evaluates [`PerformanceIndex`] snapshots for a problem
pub struct MeritEvaluator<'a> {
    problem: &'a OptimalControlProblem,
    settings: &'a DdpSettings,
    targets: &'a TargetTrajectories,
}

impl<'a> MeritEvaluator<'a> {
    pub fn new(problem: &'a OptimalControlProblem, settings: &'a DdpSettings, targets: &'a TargetTrajectories) -> Self {
        Self {
            problem,
            settings,
            targets,
        }
    }

    pub fn evaluate(&self, trajectory: &RolloutTrajectory) -> Result<PerformanceIndex, ModelError> {
        let mut index = PerformanceIndex::default();
        let Some(last) = trajectory.len().checked_sub(1) else {
            return Ok(index);
        };

        let mut previous = self.sample(trajectory, 0)?;
        for k in 1..=last {
            let current = self.sample(trajectory, k)?;
            let dt = trajectory.time[k] - trajectory.time[k - 1];
            if dt > 0.0 {
                let half = 0.5 * dt;
                index.cost += half * (previous.cost + current.cost);
                index.state_input_eq_constraint_ise += half * (previous.state_input_eq + current.state_input_eq);
                index.state_eq_constraint_ise += half * (previous.state_eq + current.state_eq);
                index.inequality_constraint_penalty += half * (previous.penalty + current.penalty);
            }
            previous = current;
        }

        let (tf, xf) = (trajectory.time[last], &trajectory.state[last]);
        index.cost += self.problem.cost.final_cost(tf, xf, self.targets)?;
        index.state_eq_final_constraint_sse = self.problem.final_state_constraint_value(tf, xf)?.norm_squared();

        index.merit = index.cost
            + index.inequality_constraint_penalty
            + 0.5 * self.settings.constraint_penalty_coeff * index.state_input_eq_constraint_ise
            + 0.5
                * self.settings.state_constraint_penalty_coeff
                * (index.state_eq_constraint_ise + index.state_eq_final_constraint_sse);
        Ok(index)
    }

    fn sample(&self, trajectory: &RolloutTrajectory, k: usize) -> Result<SampleMetrics, ModelError> {
        let (t, x, u) = (trajectory.time[k], &trajectory.state[k], &trajectory.input[k]);
        Ok(SampleMetrics {
            cost: self.problem.cost.cost(t, x, u, self.targets)?,
            state_input_eq: self.problem.equality_constraint_value(t, x, u)?.norm_squared(),
            state_eq: self.problem.state_equality_constraint_value(t, x)?.norm_squared(),
            penalty: self.problem.soft_constraint_penalty(t, x, u)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use hyddp_core::constraint::LinearStateInputConstraint;
    use hyddp_core::cost::QuadraticCost;
    use hyddp_core::dynamics::LinearSystemDynamics;
    use hyddp_core::{Matrix, Vector};

    fn trajectory() -> RolloutTrajectory {
        RolloutTrajectory {
            time: vec![0.0, 0.5, 0.5, 1.0],
            state: vec![
                Vector::from_vec(vec![1.0]),
                Vector::from_vec(vec![1.0]),
                Vector::from_vec(vec![1.0]),
                Vector::from_vec(vec![1.0]),
            ],
            input: vec![Vector::from_vec(vec![0.0]); 4],
            post_event_indices: vec![2],
        }
    }

    fn problem() -> OptimalControlProblem {
        let dynamics = LinearSystemDynamics::new(Matrix::zeros(1, 1), Matrix::identity(1, 1));
        let cost = QuadraticCost::new(Matrix::identity(1, 1) * 2.0, Matrix::identity(1, 1), Matrix::identity(1, 1));
        OptimalControlProblem::new(Arc::new(dynamics), Arc::new(cost))
    }

    #[test]
    fn test_trapezoid_skips_event_duplicates() {
        let p = problem();
        let settings = DdpSettings::default();
        let targets = TargetTrajectories::default();
        let index = MeritEvaluator::new(&p, &settings, &targets).evaluate(&trajectory()).unwrap();
        // ∫ ½·2·1 dt over [0, 1] + ½·1
        assert_relative_eq!(index.cost, 1.5, epsilon = 1e-12);
        assert_relative_eq!(index.merit, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_constraint_ise_enters_merit() {
        let p = problem().with_equality_constraint(Arc::new(LinearStateInputConstraint::new(
            Matrix::identity(1, 1),
            Matrix::identity(1, 1),
            Vector::zeros(1),
        )));
        let settings = DdpSettings {
            constraint_penalty_coeff: 4.0,
            ..Default::default()
        };
        let targets = TargetTrajectories::default();
        let index = MeritEvaluator::new(&p, &settings, &targets).evaluate(&trajectory()).unwrap();
        assert_relative_eq!(index.state_input_eq_constraint_ise, 1.0, epsilon = 1e-12);
        assert_relative_eq!(index.merit, 1.5 + 2.0, epsilon = 1e-12);
    }
}
