//! Closed-loop rollout integration tests

use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use hyddp_core::control::{FeedforwardController, LinearController};
use hyddp_core::dynamics::{LinearSystemDynamics, SystemDynamics};
use hyddp_core::math::IntegratorType;
use hyddp_core::rollout::{RolloutError, RolloutSettings, TimeTriggeredRollout};
use hyddp_core::{Matrix, ModeSchedule, ModelError, Vector, VectorFunctionLinearApproximation};

/// Harmonic oscillator `ẍ = -x + u`
fn oscillator() -> LinearSystemDynamics {
    LinearSystemDynamics::new(
        Matrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]),
        Matrix::from_row_slice(2, 1, &[0.0, 1.0]),
    )
}

/// Ball that loses half of its velocity at every impact
struct BouncingBall;

impl SystemDynamics for BouncingBall {
    fn state_dim(&self) -> usize {
        2
    }

    fn input_dim(&self) -> usize {
        1
    }

    fn flow_map(&self, _time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError> {
        Ok(Vector::from_vec(vec![state[1], -9.81 + input[0]]))
    }

    fn linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        Ok(VectorFunctionLinearApproximation {
            f: self.flow_map(time, state, input)?,
            dfdx: Matrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            dfdu: Matrix::from_row_slice(2, 1, &[0.0, 1.0]),
        })
    }

    fn jump_map(&self, _time: f64, state: &Vector) -> Result<Vector, ModelError> {
        Ok(Vector::from_vec(vec![state[0], -0.5 * state[1]]))
    }
}

/// Dynamics that fail after a given time
struct FailingDynamics;

impl SystemDynamics for FailingDynamics {
    fn state_dim(&self) -> usize {
        1
    }

    fn input_dim(&self) -> usize {
        1
    }

    fn flow_map(&self, time: f64, state: &Vector, _input: &Vector) -> Result<Vector, ModelError> {
        if time > 0.5 {
            return Err(ModelError::DynamicsEvaluationFailed("model left its domain".into()));
        }
        Ok(-state)
    }

    fn linear_approximation(
        &self,
        _time: f64,
        _state: &Vector,
        _input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        Err(ModelError::ApproximationUnavailable { what: "failing dynamics" })
    }
}

#[test]
fn test_zero_control_reproduces_ivp_solution() {
    let rollout = TimeTriggeredRollout::new(Arc::new(oscillator()), RolloutSettings::default());
    let x0 = Vector::from_vec(vec![1.0, 0.0]);
    let controller = FeedforwardController::constant(Vector::zeros(1));
    let traj = rollout
        .run(0.0, &x0, 2.0, &controller, &ModeSchedule::default())
        .unwrap();

    for (t, x) in traj.time.iter().zip(&traj.state) {
        assert_relative_eq!(x[0], t.cos(), epsilon = 1e-5);
        assert_relative_eq!(x[1], -t.sin(), epsilon = 1e-5);
    }
    assert_eq!(traj.state.len(), traj.input.len());
}

#[test]
fn test_rk4_and_rkf45_agree() {
    let x0 = Vector::from_vec(vec![1.0, 0.0]);
    let controller = FeedforwardController::constant(Vector::from_vec(vec![0.3]));
    let adaptive = TimeTriggeredRollout::new(Arc::new(oscillator()), RolloutSettings::default())
        .run(0.0, &x0, 1.0, &controller, &ModeSchedule::default())
        .unwrap();
    let fixed = TimeTriggeredRollout::new(
        Arc::new(oscillator()),
        RolloutSettings {
            integrator: IntegratorType::Rk4,
            ..Default::default()
        },
    )
    .run(0.0, &x0, 1.0, &controller, &ModeSchedule::default())
    .unwrap();

    assert_eq!(adaptive.time, fixed.time);
    assert_relative_eq!(
        adaptive.final_state().unwrap(),
        fixed.final_state().unwrap(),
        epsilon = 1e-5
    );
}

#[test]
fn test_jump_map_applied_at_event() {
    let rollout = TimeTriggeredRollout::new(Arc::new(BouncingBall), RolloutSettings::default());
    let schedule = ModeSchedule::new(vec![0.5], vec![0, 1]).unwrap();
    let x0 = Vector::from_vec(vec![0.0, 4.905]);
    let controller = FeedforwardController::constant(Vector::zeros(1));
    let traj = rollout.run(0.0, &x0, 1.0, &controller, &schedule).unwrap();

    let post = traj.post_event_indices[0];
    let pre_state = &traj.state[post - 1];
    let post_state = &traj.state[post];
    assert_relative_eq!(pre_state[1], 0.0, epsilon = 1e-6);
    assert_relative_eq!(post_state[0], pre_state[0]);
    assert_relative_eq!(post_state[1], -0.5 * pre_state[1]);

    // Events outside the horizon are ignored
    let late = ModeSchedule::new(vec![5.0], vec![0, 1]).unwrap();
    let traj = rollout.run(0.0, &x0, 1.0, &controller, &late).unwrap();
    assert!(traj.post_event_indices.is_empty());
}

#[test]
fn test_model_errors_are_forwarded() {
    let rollout = TimeTriggeredRollout::new(Arc::new(FailingDynamics), RolloutSettings::default());
    let controller = FeedforwardController::constant(Vector::zeros(1));
    let result = rollout.run(0.0, &Vector::from_vec(vec![1.0]), 1.0, &controller, &ModeSchedule::default());
    assert!(matches!(
        result,
        Err(RolloutError::Model(ModelError::DynamicsEvaluationFailed(_)))
    ));
}

#[test]
fn test_concurrent_rollouts_are_identical() {
    let rollout = Arc::new(TimeTriggeredRollout::new(Arc::new(oscillator()), RolloutSettings::default()));
    let controller = Arc::new(LinearController::new(
        vec![0.0, 1.0],
        vec![Vector::zeros(1), Vector::zeros(1)],
        vec![Vector::zeros(1), Vector::zeros(1)],
        vec![Matrix::from_row_slice(1, 2, &[-1.0, -1.0]); 2],
    ));
    let x0 = Vector::from_vec(vec![1.0, 0.0]);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let rollout = Arc::clone(&rollout);
            let controller = Arc::clone(&controller);
            let x0 = x0.clone();
            thread::spawn(move || {
                rollout
                    .run(0.0, &x0, 1.0, controller.as_ref(), &ModeSchedule::default())
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for traj in &results[1..] {
        assert_eq!(traj, &results[0]);
    }
}
