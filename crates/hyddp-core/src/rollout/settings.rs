//! Rollout settings

use serde::{Deserialize, Serialize};

use crate::math::IntegratorType;

/// Integration tolerances and output grid of a rollout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    /// Absolute integration tolerance
    pub abs_tol_ode: f64,
    /// Relative integration tolerance
    pub rel_tol_ode: f64,
    /// Spacing of the output grid [s]
    pub time_step: f64,
    /// Step budget per second of simulated time
    pub max_num_steps_per_second: usize,
    pub integrator: IntegratorType,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            abs_tol_ode: 1e-9,
            rel_tol_ode: 1e-6,
            time_step: 1e-2,
            max_num_steps_per_second: 10_000,
            integrator: IntegratorType::Rkf45,
        }
    }
}
