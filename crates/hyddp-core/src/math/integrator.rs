//! Numerical integration methods
//!
//! Fixed-step Euler / RK4 and adaptive Runge-Kutta-Fehlberg 4(5)
//! integrators for `dx/dt = f(t, x)` on dynamically sized states.
//!
//! Derivative functions are fallible: model errors are forwarded
//! unchanged to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ModelError, Vector};

/// Integration failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("step budget of {max_steps} steps exhausted at t = {time}")]
    StepBudgetExceeded { time: f64, max_steps: usize },
    #[error("step size underflow at t = {time} (dt = {step:e})")]
    StepSizeUnderflow { time: f64, step: f64 },
    #[error("non-finite state at t = {time}")]
    NonFiniteState { time: f64 },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Integration scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegratorType {
    /// Explicit Euler, fixed step
    Euler,
    /// Classic 4th-order Runge-Kutta, fixed step
    Rk4,
    /// Runge-Kutta-Fehlberg 4(5) with error control
    Rkf45,
}

/// Tolerances and budgets for a single integration call
#[derive(Debug, Clone)]
pub struct IntegrationSettings {
    /// Integration scheme
    pub integrator: IntegratorType,
    /// Absolute error tolerance (adaptive only)
    pub abs_tol: f64,
    /// Relative error tolerance (adaptive only)
    pub rel_tol: f64,
    /// Maximum (fixed) or initial (adaptive) step size
    pub max_step: f64,
    /// Maximum number of attempted steps
    pub max_num_steps: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            integrator: IntegratorType::Rkf45,
            abs_tol: 1e-9,
            rel_tol: 1e-6,
            max_step: 1e-2,
            max_num_steps: 100_000,
        }
    }
}

/// Smallest admissible adaptive step relative to the output spacing
const MIN_STEP_RATIO: f64 = 1e-12;

/// Single RK4 step
pub fn rk4<F>(x: &Vector, t: f64, dt: f64, f: &mut F) -> Result<Vector, ModelError>
where
    F: FnMut(f64, &Vector) -> Result<Vector, ModelError>,
{
    let k1 = f(t, x)?;
    let k2 = f(t + dt / 2.0, &(x + &k1 * (dt / 2.0)))?;
    let k3 = f(t + dt / 2.0, &(x + &k2 * (dt / 2.0)))?;
    let k4 = f(t + dt, &(x + &k3 * dt))?;

    Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0))
}

/// Single explicit Euler step
pub fn euler<F>(x: &Vector, t: f64, dt: f64, f: &mut F) -> Result<Vector, ModelError>
where
    F: FnMut(f64, &Vector) -> Result<Vector, ModelError>,
{
    Ok(x + f(t, x)? * dt)
}

/// Single Runge-Kutta-Fehlberg step
///
/// # Returns
/// (5th-order solution, 4th/5th-order difference)
pub fn rkf45<F>(x: &Vector, t: f64, dt: f64, f: &mut F) -> Result<(Vector, Vector), ModelError>
where
    F: FnMut(f64, &Vector) -> Result<Vector, ModelError>,
{
    // Fehlberg coefficients
    let k1 = f(t, x)?;
    let k2 = f(t + dt / 4.0, &(x + &k1 * (dt / 4.0)))?;
    let k3 = f(
        t + 3.0 * dt / 8.0,
        &(x + &k1 * (3.0 * dt / 32.0) + &k2 * (9.0 * dt / 32.0)),
    )?;
    let k4 = f(
        t + 12.0 * dt / 13.0,
        &(x + &k1 * (1932.0 * dt / 2197.0) - &k2 * (7200.0 * dt / 2197.0) + &k3 * (7296.0 * dt / 2197.0)),
    )?;
    let k5 = f(
        t + dt,
        &(x + &k1 * (439.0 * dt / 216.0) - &k2 * (8.0 * dt) + &k3 * (3680.0 * dt / 513.0)
            - &k4 * (845.0 * dt / 4104.0)),
    )?;
    let k6 = f(
        t + dt / 2.0,
        &(x - &k1 * (8.0 * dt / 27.0) + &k2 * (2.0 * dt) - &k3 * (3544.0 * dt / 2565.0)
            + &k4 * (1859.0 * dt / 4104.0)
            - &k5 * (11.0 * dt / 40.0)),
    )?;

    // 4th order solution
    let x4 = x + (&k1 * (25.0 / 216.0) + &k3 * (1408.0 / 2565.0) + &k4 * (2197.0 / 4104.0) - &k5 * (1.0 / 5.0)) * dt;

    // 5th order solution
    let x5 = x + (&k1 * (16.0 / 135.0) + &k3 * (6656.0 / 12825.0) + &k4 * (28561.0 / 56430.0)
        - &k5 * (9.0 / 50.0)
        + &k6 * (2.0 / 55.0))
        * dt;

    let error = &x5 - x4;
    Ok((x5, error))
}

/// Scaled max-norm of the local error; a step is acceptable when <= 1
fn scaled_error(error: &Vector, x_old: &Vector, x_new: &Vector, abs_tol: f64, rel_tol: f64) -> f64 {
    error
        .iter()
        .zip(x_old.iter().zip(x_new.iter()))
        .map(|(e, (a, b))| e.abs() / (abs_tol + rel_tol * a.abs().max(b.abs())))
        .fold(0.0, f64::max)
}

/// Integrate from `output_times[0]` through every output time
///
/// The state at `output_times[0]` is `x0`; the returned vector holds one
/// state per output time. Output times must be non-decreasing.
pub fn integrate<F>(
    mut f: F,
    x0: &Vector,
    output_times: &[f64],
    settings: &IntegrationSettings,
) -> Result<Vec<Vector>, IntegrationError>
where
    F: FnMut(f64, &Vector) -> Result<Vector, ModelError>,
{
    let mut states = Vec::with_capacity(output_times.len());
    let Some(&t_start) = output_times.first() else {
        return Ok(states);
    };

    let mut t = t_start;
    let mut x = x0.clone();
    let mut h = settings.max_step;
    let mut num_steps = 0usize;
    states.push(x.clone());

    for &target in &output_times[1..] {
        while target - t > 0.0 {
            num_steps += 1;
            if num_steps > settings.max_num_steps {
                return Err(IntegrationError::StepBudgetExceeded {
                    time: t,
                    max_steps: settings.max_num_steps,
                });
            }

            // Avoid leaving a sliver before the output time
            let remaining = target - t;
            let dt = if h >= remaining || remaining - h < 1e-3 * h { remaining } else { h };

            match settings.integrator {
                IntegratorType::Euler => {
                    x = euler(&x, t, dt, &mut f)?;
                    t = if dt == remaining { target } else { t + dt };
                }
                IntegratorType::Rk4 => {
                    x = rk4(&x, t, dt, &mut f)?;
                    t = if dt == remaining { target } else { t + dt };
                }
                IntegratorType::Rkf45 => {
                    let (x_new, error) = rkf45(&x, t, dt, &mut f)?;
                    let err = scaled_error(&error, &x, &x_new, settings.abs_tol, settings.rel_tol);

                    // Step size adjustment
                    let s = if err > 1e-10 { 0.9 * err.powf(-0.2) } else { 5.0 };

                    if err <= 1.0 && x_new.iter().all(|v| v.is_finite()) {
                        x = x_new;
                        t = if dt == remaining { target } else { t + dt };
                        h = (dt * s.clamp(0.2, 5.0)).min(settings.max_step);
                    } else {
                        h = dt * s.clamp(0.1, 0.5);
                        if h < MIN_STEP_RATIO * settings.max_step.max(1.0) {
                            return Err(IntegrationError::StepSizeUnderflow { time: t, step: h });
                        }
                    }
                }
            }

            if !x.iter().all(|v| v.is_finite()) {
                return Err(IntegrationError::NonFiniteState { time: t });
            }
        }
        states.push(x.clone());
    }

    Ok(states)
}
