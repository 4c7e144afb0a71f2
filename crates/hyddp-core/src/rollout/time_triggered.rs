//! Time-triggered rollout
//!
//! Integrates `ẋ = f(t, x, π(t, x))` segment by segment between the
//! events of a mode schedule:
//!
//! ```text
//!  t0 ---- grid ---- e0 | e0 ---- grid ---- e1 | e1 ---- grid ---- tf
//!                    pre  post              pre  post
//! ```

use std::sync::Arc;

use tracing::trace;

use crate::control::Controller;
use crate::dynamics::SystemDynamics;
use crate::logic::ModeSchedule;
use crate::math::{integrate, IntegrationSettings};
use crate::rollout::{RolloutError, RolloutSettings, RolloutTrajectory};
use crate::{ModelError, Vector};

/// Forward simulator of the hybrid closed loop
///
/// Holds no mutable state; `run` can be called concurrently.
#[derive(Clone)]
pub struct TimeTriggeredRollout {
    dynamics: Arc<dyn SystemDynamics>,
    settings: RolloutSettings,
}

impl TimeTriggeredRollout {
    pub fn new(dynamics: Arc<dyn SystemDynamics>, settings: RolloutSettings) -> Self {
        Self { dynamics, settings }
    }

    pub fn settings(&self) -> &RolloutSettings {
        &self.settings
    }

    pub fn dynamics(&self) -> &Arc<dyn SystemDynamics> {
        &self.dynamics
    }

    /// Simulate from `(t0, x0)` to `tf`
    pub fn run(
        &self,
        t0: f64,
        x0: &Vector,
        tf: f64,
        controller: &dyn Controller,
        mode_schedule: &ModeSchedule,
    ) -> Result<RolloutTrajectory, RolloutError> {
        if !(tf > t0) || !t0.is_finite() || !tf.is_finite() {
            return Err(RolloutError::InvalidHorizon { t0, tf });
        }
        let nx = self.dynamics.state_dim();
        if x0.len() != nx {
            return Err(ModelError::DimensionMismatch {
                context: "rollout initial state",
                expected: nx,
                got: x0.len(),
            }
            .into());
        }

        let events = mode_schedule.event_times_in(t0, tf);
        let mut boundaries = Vec::with_capacity(events.len() + 2);
        boundaries.push(t0);
        boundaries.extend_from_slice(events);
        boundaries.push(tf);

        let mut trajectory = RolloutTrajectory::default();
        let mut x = x0.clone();

        for (segment, window) in boundaries.windows(2).enumerate() {
            let (start, end) = (window[0], window[1]);
            if segment > 0 {
                trajectory.post_event_indices.push(trajectory.time.len());
            }

            let output_times = self.output_grid(t0, start, end);
            let settings = IntegrationSettings {
                integrator: self.settings.integrator,
                abs_tol: self.settings.abs_tol_ode,
                rel_tol: self.settings.rel_tol_ode,
                max_step: self.settings.time_step,
                max_num_steps: self.step_budget(end - start),
            };

            let dynamics = &self.dynamics;
            let states = integrate(
                |t, state: &Vector| {
                    let u = controller.compute_input(t, state);
                    dynamics.flow_map(t, state, &u)
                },
                &x,
                &output_times,
                &settings,
            )?;

            for (&t, state) in output_times.iter().zip(states) {
                let u = controller.compute_input(t, &state);
                trajectory.time.push(t);
                trajectory.input.push(u);
                trajectory.state.push(state);
            }

            if segment + 2 < boundaries.len() {
                let pre_event = trajectory.state.last().cloned().unwrap_or_else(|| x.clone());
                x = self.dynamics.jump_map(end, &pre_event)?;
                trace!(event_time = end, "applied jump map");
            }
        }

        Ok(trajectory)
    }

    /// Output samples of `[start, end]` on the global grid `t0 + k·time_step`
    fn output_grid(&self, t0: f64, start: f64, end: f64) -> Vec<f64> {
        let dt = self.settings.time_step;
        let min_gap = dt * 1e-6;
        let mut times = vec![start];
        let mut k = ((start - t0) / dt).floor() as i64 + 1;
        loop {
            let t = t0 + k as f64 * dt;
            if t >= end - min_gap {
                break;
            }
            if t > start + min_gap {
                times.push(t);
            }
            k += 1;
        }
        times.push(end);
        times
    }

    /// Integration steps allowed for a segment of `duration` seconds
    fn step_budget(&self, duration: f64) -> usize {
        ((self.settings.max_num_steps_per_second as f64 * duration).ceil() as usize).max(1)
    }
}
