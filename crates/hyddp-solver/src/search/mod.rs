//! Globalization strategies
//!
//! - [`LineSearch`]: backtracking on the feedforward step length with an
//!   Armijo test, trials evaluated in parallel batches
//! - [`LevenbergMarquardt`]: full steps with an adaptive Riccati damping

pub mod levenberg_marquardt;
pub mod line_search;

pub use levenberg_marquardt::*;
pub use line_search::*;

use rayon::ThreadPool;
use thiserror::Error;

use hyddp_core::control::LinearController;
use hyddp_core::rollout::{RolloutError, RolloutTrajectory, TimeTriggeredRollout};
use hyddp_core::{ModeSchedule, ModelError, PerformanceIndex, Vector};

use crate::merit::MeritEvaluator;

/// Search failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    #[error("line search reached the minimum step length {min_step_length}")]
    LineSearchExhausted { min_step_length: f64 },
    #[error("{rejections} successive steps rejected")]
    RegularizationExhausted { rejections: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Everything a strategy needs to try steps around the nominal
pub struct SearchContext<'a> {
    pub pool: &'a ThreadPool,
    pub rollout: &'a TimeTriggeredRollout,
    pub merit: &'a MeritEvaluator<'a>,
    pub mode_schedule: &'a ModeSchedule,
    pub t0: f64,
    pub x0: &'a Vector,
    pub tf: f64,
    /// Policy of the last backward pass, feedforward update in `delta_bias`
    pub controller: &'a LinearController,
    pub nominal: &'a PerformanceIndex,
    pub expected_descent: f64,
    /// Expected descent regarded as zero
    pub min_expected_descent: f64,
}

/// An evaluated step
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStep {
    pub step_length: f64,
    /// Policy with the step length folded into the bias
    pub controller: LinearController,
    pub trajectory: RolloutTrajectory,
    pub performance: PerformanceIndex,
}

/// Result of one search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The step becomes the new nominal
    Accepted(SearchStep),
    /// Redo the backward pass with the updated regularization
    Rejected,
}

/// Common interface of the globalization strategies
pub trait SearchStrategy: Send {
    /// Regularization `δ` for the next backward pass
    fn riccati_regularization(&self) -> f64;

    fn search(&mut self, ctx: &SearchContext<'_>) -> Result<SearchOutcome, SearchError>;

    /// Forget adapted state between solves
    fn reset(&mut self);
}

impl SearchContext<'_> {
    /// Predicted merit reduction of step length `α`
    pub fn predicted_reduction(&self, step_length: f64) -> f64 {
        (step_length - 0.5 * step_length * step_length) * self.expected_descent
    }

    /// Roll out and evaluate step length `α`
    ///
    /// Returns `None` when the trial diverges; collaborator failures are
    /// propagated.
    pub fn evaluate(&self, step_length: f64) -> Result<Option<SearchStep>, ModelError> {
        let controller = self.controller.with_step_length(step_length);
        let trajectory = match self
            .rollout
            .run(self.t0, self.x0, self.tf, &controller, self.mode_schedule)
        {
            Ok(trajectory) => trajectory,
            Err(RolloutError::Model(err)) => return Err(err),
            Err(_) => return Ok(None),
        };
        let performance = self.merit.evaluate(&trajectory)?;
        if !performance.merit.is_finite() {
            return Ok(None);
        }
        Ok(Some(SearchStep {
            step_length,
            controller,
            trajectory,
            performance,
        }))
    }
}
