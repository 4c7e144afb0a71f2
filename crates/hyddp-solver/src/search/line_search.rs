//! Backtracking line search
//!
//! Step lengths `α_max, α_max·ρ, α_max·ρ², …` down to `α_min`. A trial is
//! accepted by the Armijo test
//!
//! ```text
//! merit_nom - merit(α) >= c · (α - α²/2) · descent
//! ```
//!
//! Trials run in batches of `n_threads`; within a batch the largest passing
//! step length wins, so the result does not depend on the batch size.

use rayon::prelude::*;
use tracing::trace;

use crate::config::LineSearchSettings;
use crate::search::{SearchContext, SearchError, SearchOutcome, SearchStep, SearchStrategy};

pub struct LineSearch {
    settings: LineSearchSettings,
    regularization: f64,
    batch_size: usize,
}

impl LineSearch {
    pub fn new(settings: LineSearchSettings, regularization: f64, batch_size: usize) -> Self {
        Self {
            settings,
            regularization,
            batch_size: batch_size.max(1),
        }
    }

    /// Trial step lengths in decreasing order
    pub fn step_lengths(&self) -> Vec<f64> {
        let mut steps = Vec::new();
        let mut alpha = self.settings.max_step_length;
        // Guard against rounding just below the minimum
        while alpha >= self.settings.min_step_length * (1.0 - 1e-12) {
            steps.push(alpha);
            alpha *= self.settings.contraction_rate;
        }
        steps
    }

    fn passes(&self, ctx: &SearchContext<'_>, step: &SearchStep) -> bool {
        let actual = ctx.nominal.merit - step.performance.merit;
        if ctx.expected_descent <= ctx.min_expected_descent {
            actual > 0.0
        } else {
            actual >= self.settings.armijo_coefficient * ctx.predicted_reduction(step.step_length)
        }
    }
}

impl SearchStrategy for LineSearch {
    fn riccati_regularization(&self) -> f64 {
        self.regularization
    }

    fn search(&mut self, ctx: &SearchContext<'_>) -> Result<SearchOutcome, SearchError> {
        let steps = self.step_lengths();
        for batch in steps.chunks(self.batch_size) {
            let trials = ctx
                .pool
                .install(|| batch.par_iter().map(|&alpha| ctx.evaluate(alpha)).collect::<Vec<_>>());

            for trial in trials {
                let Some(step) = trial? else {
                    continue;
                };
                trace!(
                    step_length = step.step_length,
                    merit = step.performance.merit,
                    "line search trial"
                );
                if self.passes(ctx, &step) {
                    return Ok(SearchOutcome::Accepted(step));
                }
            }
        }
        Err(SearchError::LineSearchExhausted {
            min_step_length: self.settings.min_step_length,
        })
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_step_lengths() {
        let search = LineSearch::new(
            LineSearchSettings {
                min_step_length: 0.1,
                max_step_length: 1.0,
                contraction_rate: 0.5,
                armijo_coefficient: 1e-4,
            },
            1e-9,
            4,
        );
        let steps = search.step_lengths();
        assert_eq!(steps.len(), 4);
        assert_relative_eq!(steps[0], 1.0);
        assert_relative_eq!(steps[3], 0.125);
    }

    #[test]
    fn test_minimum_step_is_included() {
        let search = LineSearch::new(
            LineSearchSettings {
                min_step_length: 0.25,
                ..Default::default()
            },
            0.0,
            1,
        );
        assert_eq!(search.step_lengths(), vec![1.0, 0.5, 0.25]);
    }
}
