//! Solver output snapshots

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::control::{Controller, LinearController};
use crate::logic::ModeSchedule;
use crate::math::interpolate;
use crate::rollout::RolloutTrajectory;
use crate::Vector;

/// Accepted primal trajectory and the policy that produced it
///
/// Replaced wholesale every iteration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrimalSolution {
    pub time: Vec<f64>,
    pub state: Vec<Vector>,
    pub input: Vec<Vector>,
    pub post_event_indices: Vec<usize>,
    pub mode_schedule: ModeSchedule,
    pub controller: LinearController,
}

impl PrimalSolution {
    pub fn from_rollout(rollout: RolloutTrajectory, mode_schedule: ModeSchedule, controller: LinearController) -> Self {
        Self {
            time: rollout.time,
            state: rollout.state,
            input: rollout.input,
            post_event_indices: rollout.post_event_indices,
            mode_schedule,
            controller,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn final_time(&self) -> Option<f64> {
        self.time.last().copied()
    }

    /// Interpolated state at `time`
    pub fn state_at(&self, time: f64) -> Option<Vector> {
        (!self.state.is_empty()).then(|| interpolate(&self.time, &self.state, time))
    }

    /// Policy input at `(time, state)`, or the nominal input without a policy
    pub fn input_at(&self, time: f64, state: &Vector) -> Option<Vector> {
        if !self.controller.is_empty() {
            Some(self.controller.compute_input(time, state))
        } else if !self.input.is_empty() {
            Some(interpolate(&self.time, &self.input, time))
        } else {
            None
        }
    }
}

/// Merit decomposition of a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceIndex {
    /// Objective minimized by the search strategies
    pub merit: f64,
    /// Integrated running cost plus terminal cost
    pub cost: f64,
    /// ∫ ‖g(t, x, u)‖² dt of the state-input equality constraints
    pub state_input_eq_constraint_ise: f64,
    /// ∫ ‖h(t, x)‖² dt of the state-only equality constraints
    pub state_eq_constraint_ise: f64,
    /// ‖h_f(x_f)‖² of the final state constraints
    pub state_eq_final_constraint_sse: f64,
    /// Integrated soft-constraint penalty
    pub inequality_constraint_penalty: f64,
}

impl PerformanceIndex {
    /// Total equality constraint violation
    pub fn total_constraint_ise(&self) -> f64 {
        self.state_input_eq_constraint_ise + self.state_eq_constraint_ise + self.state_eq_final_constraint_sse
    }
}

impl fmt::Display for PerformanceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "merit:                           {:.6e}", self.merit)?;
        writeln!(f, "cost:                            {:.6e}", self.cost)?;
        writeln!(f, "state-input equality ISE:        {:.6e}", self.state_input_eq_constraint_ise)?;
        writeln!(f, "state equality ISE:              {:.6e}", self.state_eq_constraint_ise)?;
        writeln!(f, "final state equality SSE:        {:.6e}", self.state_eq_final_constraint_sse)?;
        write!(f, "inequality penalty:              {:.6e}", self.inequality_constraint_penalty)
    }
}
