//! Levenberg-Marquardt strategy
//!
//! One full step per backward pass. The ratio of actual to predicted merit
//! reduction adapts the Riccati damping:
//!
//! ```text
//! ρ > ρ_max  =>  damping decreases geometrically
//! ρ < ρ_min  =>  damping increases by a growing factor
//! ```
//!
//! The step is kept iff it rolled out and `ρ >= ρ_min`; otherwise the
//! backward pass is recomputed on the same linearization with the larger
//! damping.

use tracing::debug;

use crate::config::LevenbergMarquardtSettings;
use crate::search::{SearchContext, SearchError, SearchOutcome, SearchStrategy};

pub struct LevenbergMarquardt {
    settings: LevenbergMarquardtSettings,
    damping: f64,
    /// Current multiplier of the geometric update
    growth: f64,
    successive_rejections: usize,
}

impl LevenbergMarquardt {
    pub fn new(settings: LevenbergMarquardtSettings) -> Self {
        let damping = settings.initial_damping;
        Self {
            settings,
            damping,
            growth: 1.0,
            successive_rejections: 0,
        }
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    /// Adapt the damping to the reduction ratio `rho`
    pub fn update_damping(&mut self, rho: f64) {
        let factor = self.settings.damping_factor;
        if rho < self.settings.min_accepted_rho {
            self.growth = self.growth.max(1.0) * factor;
            self.damping = (self.damping * self.growth).max(self.settings.initial_damping);
        } else if rho > self.settings.max_rho_for_decrease {
            self.growth = self.growth.min(1.0) / factor;
            self.damping = (self.damping * self.growth).max(self.settings.initial_damping);
        }
    }
}

impl SearchStrategy for LevenbergMarquardt {
    fn riccati_regularization(&self) -> f64 {
        self.damping
    }

    fn search(&mut self, ctx: &SearchContext<'_>) -> Result<SearchOutcome, SearchError> {
        let trial = ctx.evaluate(1.0)?;
        let actual = trial
            .as_ref()
            .map_or(f64::NEG_INFINITY, |step| ctx.nominal.merit - step.performance.merit);
        let predicted = ctx.predicted_reduction(1.0);
        let rho = if predicted > ctx.min_expected_descent {
            actual / predicted
        } else if actual > 0.0 {
            1.0
        } else {
            0.0
        };
        self.update_damping(rho);
        debug!(rho, actual, predicted, damping = self.damping, "levenberg-marquardt step");

        match trial {
            Some(step) if rho >= self.settings.min_accepted_rho => {
                self.successive_rejections = 0;
                Ok(SearchOutcome::Accepted(step))
            }
            _ => {
                self.successive_rejections += 1;
                if self.successive_rejections > self.settings.max_num_successive_rejections {
                    Err(SearchError::RegularizationExhausted {
                        rejections: self.successive_rejections,
                    })
                } else {
                    Ok(SearchOutcome::Rejected)
                }
            }
        }
    }

    fn reset(&mut self) {
        self.damping = self.settings.initial_damping;
        self.growth = 1.0;
        self.successive_rejections = 0;
    }
}
