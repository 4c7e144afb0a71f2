//! Target trajectories
//!
//! Time-stamped desired states and inputs, linearly interpolated and
//! clamped outside the sampled range.

use serde::{Deserialize, Serialize};

use crate::math::interpolate;
use crate::Vector;

/// Desired state/input references
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetTrajectories {
    pub time: Vec<f64>,
    pub state: Vec<Vector>,
    pub input: Vec<Vector>,
}

impl TargetTrajectories {
    /// Create target trajectories
    ///
    /// # Panics
    /// If the three sequences have different lengths.
    pub fn new(time: Vec<f64>, state: Vec<Vector>, input: Vec<Vector>) -> Self {
        assert_eq!(time.len(), state.len(), "time and state lengths differ");
        assert_eq!(time.len(), input.len(), "time and input lengths differ");
        Self { time, state, input }
    }

    /// Constant set point
    pub fn constant(state: Vector, input: Vector) -> Self {
        Self {
            time: vec![0.0],
            state: vec![state],
            input: vec![input],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Interpolated desired state at `time`
    ///
    /// Returns `None` when no target is installed.
    pub fn desired_state(&self, time: f64) -> Option<Vector> {
        if self.state.is_empty() {
            return None;
        }
        Some(interpolate(&self.time, &self.state, time))
    }

    /// Interpolated desired input at `time`
    pub fn desired_input(&self, time: f64) -> Option<Vector> {
        if self.input.is_empty() {
            return None;
        }
        Some(interpolate(&self.time, &self.input, time))
    }
}
