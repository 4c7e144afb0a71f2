//! Affine feedback and feedforward controllers

use crate::control::Controller;
use crate::math::{interpolate, time_segment};
use crate::{Matrix, Vector};

/// Time-varying affine controller
///
/// ```text
/// u(t, x) = bias(t) + α·delta_bias(t) + K(t) x
/// ```
///
/// `delta_bias` holds the feedforward update of the last backward pass so
/// that trial step lengths can be applied without recomputing gains.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearController {
    pub time: Vec<f64>,
    pub bias: Vec<Vector>,
    pub delta_bias: Vec<Vector>,
    pub gain: Vec<Matrix>,
}

impl LinearController {
    /// # Panics
    /// If the sequences have different lengths.
    pub fn new(time: Vec<f64>, bias: Vec<Vector>, delta_bias: Vec<Vector>, gain: Vec<Matrix>) -> Self {
        assert_eq!(time.len(), bias.len(), "time and bias lengths differ");
        assert_eq!(time.len(), delta_bias.len(), "time and delta bias lengths differ");
        assert_eq!(time.len(), gain.len(), "time and gain lengths differ");
        Self {
            time,
            bias,
            delta_bias,
            gain,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Controller with the feedforward update scaled by `step_length` and
    /// folded into the bias
    pub fn with_step_length(&self, step_length: f64) -> Self {
        let bias = self
            .bias
            .iter()
            .zip(&self.delta_bias)
            .map(|(b, db)| b + db * step_length)
            .collect();
        let delta_bias = self.delta_bias.iter().map(|db| Vector::zeros(db.len())).collect();
        Self {
            time: self.time.clone(),
            bias,
            delta_bias,
            gain: self.gain.clone(),
        }
    }

    /// Feedforward part `bias + delta_bias` at `time`
    pub fn feedforward(&self, time: f64) -> Vector {
        interpolate(&self.time, &self.bias, time) + interpolate(&self.time, &self.delta_bias, time)
    }

    /// Feedback gain at `time`
    pub fn gain_at(&self, time: f64) -> Matrix {
        interpolate(&self.time, &self.gain, time)
    }
}

impl Controller for LinearController {
    /// # Panics
    /// If the controller holds no samples.
    fn compute_input(&self, time: f64, state: &Vector) -> Vector {
        let (index, alpha) = time_segment(&self.time, time);
        if self.time.len() < 2 || alpha == 0.0 {
            return &self.bias[index] + &self.delta_bias[index] + &self.gain[index] * state;
        }
        let at = |i: usize| &self.bias[i] + &self.delta_bias[i] + &self.gain[i] * state;
        at(index) * (1.0 - alpha) + at(index + 1) * alpha
    }
}

/// Open-loop input trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct FeedforwardController {
    pub time: Vec<f64>,
    pub input: Vec<Vector>,
}

impl FeedforwardController {
    pub fn new(time: Vec<f64>, input: Vec<Vector>) -> Self {
        assert_eq!(time.len(), input.len(), "time and input lengths differ");
        assert!(!input.is_empty(), "feedforward controller needs at least one sample");
        Self { time, input }
    }

    /// Constant input (operating point)
    pub fn constant(input: Vector) -> Self {
        Self {
            time: vec![0.0],
            input: vec![input],
        }
    }
}

impl Controller for FeedforwardController {
    fn compute_input(&self, time: f64, _state: &Vector) -> Vector {
        interpolate(&self.time, &self.input, time)
    }
}
