//! Forward rollout of the hybrid dynamics
//!
//! - [`RolloutSettings`]: integration tolerances and output grid
//! - [`TimeTriggeredRollout`]: integrates mode by mode, applying the jump
//!   map at every event time inside the horizon

pub mod settings;
pub mod time_triggered;

pub use settings::*;
pub use time_triggered::*;

use thiserror::Error;

use crate::math::IntegrationError;
use crate::{ModelError, Vector};

/// Rollout failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RolloutError {
    #[error("invalid horizon [{t0}, {tf}]")]
    InvalidHorizon { t0: f64, tf: f64 },
    #[error("integration diverged: {0}")]
    IntegrationDiverged(IntegrationError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<IntegrationError> for RolloutError {
    fn from(err: IntegrationError) -> Self {
        match err {
            IntegrationError::Model(e) => RolloutError::Model(e),
            other => RolloutError::IntegrationDiverged(other),
        }
    }
}

/// Sampled closed-loop trajectory
///
/// At each event time two samples share the same stamp: the pre-event
/// sample at `post_event_indices[i] - 1` and the post-event sample at
/// `post_event_indices[i]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RolloutTrajectory {
    pub time: Vec<f64>,
    pub state: Vec<Vector>,
    pub input: Vec<Vector>,
    pub post_event_indices: Vec<usize>,
}

impl RolloutTrajectory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn final_state(&self) -> Option<&Vector> {
        self.state.last()
    }

    /// Whether sample `index` is the last sample before an event
    pub fn is_pre_event(&self, index: usize) -> bool {
        self.post_event_indices.iter().any(|&p| p == index + 1)
    }
}
