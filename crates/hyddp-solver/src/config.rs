//! Solver configuration
//!
//! Settings are plain data: immutable during a solve and serializable so
//! callers can load them from any `serde` format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hyddp_core::rollout::RolloutSettings;

/// Invalid configuration values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: &'static str },
}

/// DDP variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Sequential linear-quadratic: continuous-time Riccati equations
    Slq,
    /// Iterative LQR: Euler-discretized Riccati recursion
    Ilqr,
}

/// Globalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategyType {
    LineSearch,
    LevenbergMarquardt,
}

/// Backtracking line-search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchSettings {
    /// Smallest step length tried
    pub min_step_length: f64,
    /// First step length tried
    pub max_step_length: f64,
    /// Step length contraction per trial
    pub contraction_rate: f64,
    /// Armijo sufficient-decrease coefficient
    pub armijo_coefficient: f64,
}

impl Default for LineSearchSettings {
    fn default() -> Self {
        Self {
            min_step_length: 0.05,
            max_step_length: 1.0,
            contraction_rate: 0.5,
            armijo_coefficient: 1e-4,
        }
    }
}

/// Levenberg-Marquardt trust-region parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardtSettings {
    /// Reduction ratio below which the damping increases
    pub min_accepted_rho: f64,
    /// Reduction ratio above which the damping decreases
    pub max_rho_for_decrease: f64,
    /// Damping used for the first backward pass (and its floor)
    pub initial_damping: f64,
    /// Base factor of the geometric damping update
    pub damping_factor: f64,
    /// Rejected steps tolerated in a row
    pub max_num_successive_rejections: usize,
}

impl Default for LevenbergMarquardtSettings {
    fn default() -> Self {
        Self {
            min_accepted_rho: 0.25,
            max_rho_for_decrease: 0.75,
            initial_damping: 1e-6,
            damping_factor: 4.0,
            max_num_successive_rejections: 5,
        }
    }
}

/// DDP solver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdpSettings {
    pub algorithm: Algorithm,
    pub search_strategy: SearchStrategyType,
    /// Iteration budget
    pub max_num_iterations: usize,
    /// Relative merit improvement regarded as converged
    pub min_rel_cost: f64,
    /// Equality constraint ISE regarded as satisfied
    pub constraint_tolerance: f64,
    /// Expected descent below which the step is skipped
    pub min_expected_descent: f64,
    /// Worker threads (and upper bound on the number of partitions)
    pub n_threads: usize,
    /// Log every iteration at `info` level
    pub display_info: bool,
    /// Log a summary at `info` level when a solve terminates
    pub display_short_summary: bool,
    /// Start from the policy of the previous solve when available
    pub use_feedback_policy: bool,
    /// Quadratic penalty on state-only equality constraints
    pub state_constraint_penalty_coeff: f64,
    /// Weight of the constraint ISE in the merit function
    pub constraint_penalty_coeff: f64,
    /// Smallest Riccati regularization
    pub riccati_regularization_base: f64,
    /// Growth factor of the Riccati regularization
    pub riccati_regularization_factor: f64,
    /// Regularization ceiling before a node is declared singular
    pub riccati_regularization_max: f64,
    pub rollout: RolloutSettings,
    pub line_search: LineSearchSettings,
    pub levenberg_marquardt: LevenbergMarquardtSettings,
}

impl Default for DdpSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Slq,
            search_strategy: SearchStrategyType::LineSearch,
            max_num_iterations: 15,
            min_rel_cost: 1e-3,
            constraint_tolerance: 1e-3,
            min_expected_descent: 1e-10,
            n_threads: 4,
            display_info: false,
            display_short_summary: false,
            use_feedback_policy: true,
            state_constraint_penalty_coeff: 100.0,
            constraint_penalty_coeff: 10.0,
            riccati_regularization_base: 1e-9,
            riccati_regularization_factor: 10.0,
            riccati_regularization_max: 1e6,
            rollout: RolloutSettings::default(),
            line_search: LineSearchSettings::default(),
            levenberg_marquardt: LevenbergMarquardtSettings::default(),
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            name,
            reason: "must be positive and finite",
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            name,
            reason: "must be non-negative and finite",
        })
    }
}

impl DdpSettings {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_threads == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "n_threads",
                reason: "at least one thread is required",
            });
        }
        if self.max_num_iterations == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_num_iterations",
                reason: "at least one iteration is required",
            });
        }
        non_negative("min_rel_cost", self.min_rel_cost)?;
        non_negative("constraint_tolerance", self.constraint_tolerance)?;
        non_negative("min_expected_descent", self.min_expected_descent)?;
        non_negative("state_constraint_penalty_coeff", self.state_constraint_penalty_coeff)?;
        non_negative("constraint_penalty_coeff", self.constraint_penalty_coeff)?;
        positive("riccati_regularization_base", self.riccati_regularization_base)?;
        positive("riccati_regularization_max", self.riccati_regularization_max)?;
        if !(self.riccati_regularization_factor > 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "riccati_regularization_factor",
                reason: "must be greater than one",
            });
        }

        positive("rollout.time_step", self.rollout.time_step)?;
        positive("rollout.abs_tol_ode", self.rollout.abs_tol_ode)?;
        positive("rollout.rel_tol_ode", self.rollout.rel_tol_ode)?;
        if self.rollout.max_num_steps_per_second == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "rollout.max_num_steps_per_second",
                reason: "step budget must be positive",
            });
        }

        let ls = &self.line_search;
        positive("line_search.min_step_length", ls.min_step_length)?;
        if ls.max_step_length < ls.min_step_length || ls.max_step_length > 1.0 {
            return Err(ConfigError::InvalidSetting {
                name: "line_search.max_step_length",
                reason: "must lie in [min_step_length, 1]",
            });
        }
        if !(ls.contraction_rate > 0.0 && ls.contraction_rate < 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "line_search.contraction_rate",
                reason: "must lie in (0, 1)",
            });
        }
        non_negative("line_search.armijo_coefficient", ls.armijo_coefficient)?;

        let lm = &self.levenberg_marquardt;
        if !(lm.min_accepted_rho < lm.max_rho_for_decrease) {
            return Err(ConfigError::InvalidSetting {
                name: "levenberg_marquardt.min_accepted_rho",
                reason: "must be smaller than max_rho_for_decrease",
            });
        }
        positive("levenberg_marquardt.initial_damping", lm.initial_damping)?;
        if !(lm.damping_factor > 1.0) {
            return Err(ConfigError::InvalidSetting {
                name: "levenberg_marquardt.damping_factor",
                reason: "must be greater than one",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert_eq!(DdpSettings::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let settings = DdpSettings {
            n_threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidSetting { name: "n_threads", .. })
        ));
    }

    #[test]
    fn test_contraction_rate_range() {
        let mut settings = DdpSettings::default();
        settings.line_search.contraction_rate = 1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_regularization_factor_must_grow() {
        let settings = DdpSettings {
            riccati_regularization_factor: 1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
