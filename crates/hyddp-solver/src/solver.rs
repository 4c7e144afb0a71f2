//! DDP orchestrator
//!
//! ```text
//! Initializing → Linearizing → BackwardPass → ForwardSearch ─┐
//!                    ↑                                       │
//!                    └──────────── accepted step ────────────┘
//!                                  → Converged | MaxIterations | Failed
//! ```
//!
//! Every iteration linearizes the problem around the nominal rollout, solves
//! the LQ subproblem with the partitioned Riccati pass (or an installed
//! [`QpBackend`]) and lets the search strategy pick the next nominal.

use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use hyddp_core::control::{FeedforwardController, LinearController};
use hyddp_core::cost::TargetTrajectories;
use hyddp_core::rollout::{RolloutError, RolloutTrajectory, TimeTriggeredRollout};
use hyddp_core::{Matrix, ModeSchedule, ModelError, PerformanceIndex, PrimalSolution, Vector};

use crate::config::{ConfigError, DdpSettings, SearchStrategyType};
use crate::lq::{LinearQuadraticApproximation, LinearQuadraticApproximator};
use crate::merit::MeritEvaluator;
use crate::problem::OptimalControlProblem;
use crate::qp::{backend_backward_pass, QpBackend, QpBackendError, QpStatus};
use crate::riccati::{
    partition_nodes, partitioned_backward_pass, BackwardPassSolution, Partition, Regularization, RiccatiError,
};
use crate::search::{
    LevenbergMarquardt, LineSearch, SearchContext, SearchError, SearchOutcome, SearchStep, SearchStrategy,
};

/// Solver errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("invalid horizon [{t0}, {tf}]")]
    InvalidHorizon { t0: f64, tf: f64 },
    #[error("invalid partitioning times: {0}")]
    InvalidPartitioning(&'static str),
    #[error("failed to build the thread pool: {0}")]
    ThreadPool(String),
    #[error("no feasible initial rollout: {0}")]
    InfeasibleInitialization(String),
    #[error("state-input constraint at t = {time} has rank {rank} for {rows} rows")]
    RankDeficientConstraint { time: f64, rank: usize, rows: usize },
    #[error("Riccati recursion singular at t = {time} (regularization {regularization:e})")]
    RiccatiSingular { time: f64, regularization: f64 },
    #[error("backward pass aborted")]
    BackwardPassAborted,
    #[error("line search reached the minimum step length {min_step_length}")]
    LineSearchExhausted { min_step_length: f64 },
    #[error("Levenberg-Marquardt rejected {rejections} successive steps")]
    RegularizationExhausted { rejections: usize },
    #[error("QP backend failed: {0}")]
    Qp(QpStatus),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<RiccatiError> for SolverError {
    fn from(err: RiccatiError) -> Self {
        match err {
            RiccatiError::Singular { time, regularization } => SolverError::RiccatiSingular { time, regularization },
            RiccatiError::RankDeficient { time, source } => SolverError::RankDeficientConstraint {
                time,
                rank: source.rank,
                rows: source.rows,
            },
            RiccatiError::Aborted => SolverError::BackwardPassAborted,
        }
    }
}

impl From<SearchError> for SolverError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::LineSearchExhausted { min_step_length } => SolverError::LineSearchExhausted { min_step_length },
            SearchError::RegularizationExhausted { rejections } => SolverError::RegularizationExhausted { rejections },
            SearchError::Model(err) => SolverError::Model(err),
        }
    }
}

/// Termination status of a successful solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
}

/// Where the solver currently is (or stopped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverPhase {
    #[default]
    Idle,
    Initializing,
    Linearizing,
    BackwardPass,
    ForwardSearch,
    Converged,
    MaxIterations,
    Failed,
}

/// Result of [`DdpSolver::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveSummary {
    pub status: SolveStatus,
    /// Number of accepted steps
    pub num_iterations: usize,
    /// Step length of each accepted step
    pub step_lengths: Vec<f64>,
    pub performance_index: PerformanceIndex,
    pub primal_solution: PrimalSolution,
}

enum Improvement {
    /// Feasible nominal with an expected descent too small to be worth a search
    Negligible,
    Step(SearchStep),
}

/// Hybrid SLQ/ILQR solver
pub struct DdpSolver {
    problem: OptimalControlProblem,
    settings: DdpSettings,
    pool: ThreadPool,
    rollout: TimeTriggeredRollout,
    strategy: Box<dyn SearchStrategy>,
    qp_backend: Option<Box<dyn QpBackend>>,
    mode_schedule: ModeSchedule,
    targets: TargetTrajectories,
    phase: SolverPhase,
    primal_solution: PrimalSolution,
    performance_index: PerformanceIndex,
    iteration_log: Vec<PerformanceIndex>,
}

impl DdpSolver {
    /// Validate the settings and build the worker pool
    pub fn new(problem: OptimalControlProblem, settings: DdpSettings) -> Result<Self, SolverError> {
        settings.validate()?;
        if problem.operating_input.len() != problem.input_dim() {
            return Err(ModelError::DimensionMismatch {
                context: "operating input",
                expected: problem.input_dim(),
                got: problem.operating_input.len(),
            }
            .into());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.n_threads)
            .thread_name(|i| format!("hyddp-worker-{i}"))
            .build()
            .map_err(|err| SolverError::ThreadPool(err.to_string()))?;

        let strategy: Box<dyn SearchStrategy> = match settings.search_strategy {
            SearchStrategyType::LineSearch => Box::new(LineSearch::new(
                settings.line_search.clone(),
                settings.riccati_regularization_base,
                settings.n_threads,
            )),
            SearchStrategyType::LevenbergMarquardt => {
                Box::new(LevenbergMarquardt::new(settings.levenberg_marquardt.clone()))
            }
        };

        let rollout = TimeTriggeredRollout::new(problem.dynamics.clone(), settings.rollout.clone());
        debug!(
            n_threads = settings.n_threads,
            algorithm = ?settings.algorithm,
            strategy = ?settings.search_strategy,
            "DDP solver created"
        );

        Ok(Self {
            problem,
            settings,
            pool,
            rollout,
            strategy,
            qp_backend: None,
            mode_schedule: ModeSchedule::default(),
            targets: TargetTrajectories::default(),
            phase: SolverPhase::Idle,
            primal_solution: PrimalSolution::default(),
            performance_index: PerformanceIndex::default(),
            iteration_log: Vec::new(),
        })
    }

    /// Solve the LQ subproblem with `backend` instead of the partitioned
    /// Riccati pass
    pub fn with_qp_backend(mut self, backend: Box<dyn QpBackend>) -> Self {
        self.qp_backend = Some(backend);
        self
    }

    pub fn settings(&self) -> &DdpSettings {
        &self.settings
    }

    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// Last accepted solution (empty before the first successful run)
    pub fn primal_solution(&self) -> &PrimalSolution {
        &self.primal_solution
    }

    pub fn performance_index(&self) -> &PerformanceIndex {
        &self.performance_index
    }

    /// Performance of the initial rollout followed by every accepted step
    pub fn iteration_log(&self) -> &[PerformanceIndex] {
        &self.iteration_log
    }

    pub fn mode_schedule(&self) -> &ModeSchedule {
        &self.mode_schedule
    }

    pub fn set_mode_schedule(&mut self, mode_schedule: ModeSchedule) {
        self.mode_schedule = mode_schedule;
    }

    pub fn set_target_trajectories(&mut self, targets: TargetTrajectories) {
        self.targets = targets;
    }

    /// Drop the warm start and the adapted search state
    pub fn reset(&mut self) {
        self.primal_solution = PrimalSolution::default();
        self.performance_index = PerformanceIndex::default();
        self.iteration_log.clear();
        self.strategy.reset();
        self.phase = SolverPhase::Idle;
    }

    /// Optimize over `[t0, tf]` starting at `x0`
    ///
    /// `partitioning_times` split the horizon for the backward pass; their
    /// number minus one may not exceed `n_threads`. The solution is installed
    /// only when the solve succeeds.
    pub fn run(
        &mut self,
        t0: f64,
        x0: &Vector,
        tf: f64,
        partitioning_times: &[f64],
    ) -> Result<SolveSummary, SolverError> {
        self.phase = SolverPhase::Initializing;
        let result = self.solve(t0, x0, tf, partitioning_times);
        match &result {
            Ok(summary) => {
                self.phase = match summary.status {
                    SolveStatus::Converged => SolverPhase::Converged,
                    SolveStatus::MaxIterationsReached => SolverPhase::MaxIterations,
                };
                self.primal_solution = summary.primal_solution.clone();
                self.performance_index = summary.performance_index;
                if self.settings.display_short_summary || self.settings.display_info {
                    info!(
                        status = ?summary.status,
                        iterations = summary.num_iterations,
                        merit = summary.performance_index.merit,
                        constraint_ise = summary.performance_index.total_constraint_ise(),
                        "DDP solve finished"
                    );
                } else {
                    debug!(status = ?summary.status, iterations = summary.num_iterations, "DDP solve finished");
                }
            }
            Err(err) => {
                self.phase = SolverPhase::Failed;
                warn!(%err, "DDP solve failed");
            }
        }
        result
    }

    fn solve(
        &mut self,
        t0: f64,
        x0: &Vector,
        tf: f64,
        partitioning_times: &[f64],
    ) -> Result<SolveSummary, SolverError> {
        self.check_inputs(t0, x0, tf, partitioning_times)?;

        let warm_start = (self.settings.use_feedback_policy && !self.primal_solution.controller.is_empty())
            .then(|| self.primal_solution.controller.clone());
        let initial = match &warm_start {
            Some(controller) => self.rollout.run(t0, x0, tf, controller, &self.mode_schedule),
            None => {
                let controller = FeedforwardController::constant(self.problem.operating_input.clone());
                self.rollout.run(t0, x0, tf, &controller, &self.mode_schedule)
            }
        };
        let mut trajectory = initial.map_err(|err| match err {
            RolloutError::Model(err) => SolverError::Model(err),
            other => SolverError::InfeasibleInitialization(other.to_string()),
        })?;

        let mut performance = MeritEvaluator::new(&self.problem, &self.settings, &self.targets).evaluate(&trajectory)?;
        if !performance.merit.is_finite() {
            return Err(SolverError::InfeasibleInitialization(format!(
                "initial merit is {}",
                performance.merit
            )));
        }
        let mut controller = warm_start.unwrap_or_else(|| feedforward_policy(&trajectory));
        debug!(
            merit = performance.merit,
            samples = trajectory.len(),
            warm_start = self.settings.use_feedback_policy && !self.primal_solution.is_empty(),
            "initial rollout"
        );

        let partitions = partition_nodes(&trajectory.time, partitioning_times);
        let mut log = vec![performance];
        let mut status = SolveStatus::MaxIterationsReached;
        let mut num_iterations = 0;
        let mut step_lengths = Vec::new();

        while num_iterations < self.settings.max_num_iterations {
            self.phase = SolverPhase::Linearizing;
            let lq = LinearQuadraticApproximator::new(&self.problem, &self.settings, &self.targets).approximate(
                &self.pool,
                &partitions,
                &trajectory,
            )?;

            let step = match self.improve(&lq, &partitions, t0, x0, tf, &trajectory, &performance)? {
                Improvement::Negligible => {
                    debug!(iteration = num_iterations, "expected descent negligible");
                    status = SolveStatus::Converged;
                    break;
                }
                Improvement::Step(step) => step,
            };

            num_iterations += 1;
            let previous = performance.merit;
            let relative = (previous - step.performance.merit) / previous.abs().max(f64::EPSILON);
            performance = step.performance;
            trajectory = step.trajectory;
            controller = step.controller;
            log.push(performance);
            step_lengths.push(step.step_length);

            if self.settings.display_info {
                info!(
                    iteration = num_iterations,
                    step_length = step.step_length,
                    merit = performance.merit,
                    cost = performance.cost,
                    constraint_ise = performance.total_constraint_ise(),
                    relative,
                    "DDP iteration"
                );
            } else {
                debug!(
                    iteration = num_iterations,
                    step_length = step.step_length,
                    merit = performance.merit,
                    relative,
                    "DDP iteration"
                );
            }

            let min_rel_cost = self.settings.min_rel_cost;
            if relative < min_rel_cost
                || (performance.total_constraint_ise() < self.settings.constraint_tolerance
                    && relative < 10.0 * min_rel_cost)
            {
                status = SolveStatus::Converged;
                break;
            }
        }

        self.iteration_log = log;
        Ok(SolveSummary {
            status,
            num_iterations,
            step_lengths,
            performance_index: performance,
            primal_solution: PrimalSolution::from_rollout(trajectory, self.mode_schedule.clone(), controller),
        })
    }

    fn check_inputs(&self, t0: f64, x0: &Vector, tf: f64, partitioning_times: &[f64]) -> Result<(), SolverError> {
        if !(t0.is_finite() && tf.is_finite() && tf > t0) {
            return Err(SolverError::InvalidHorizon { t0, tf });
        }
        if x0.len() != self.problem.state_dim() {
            return Err(ModelError::DimensionMismatch {
                context: "initial state",
                expected: self.problem.state_dim(),
                got: x0.len(),
            }
            .into());
        }
        if partitioning_times.len() < 2 {
            return Err(SolverError::InvalidPartitioning("at least two partitioning times are required"));
        }
        if partitioning_times.iter().any(|t| !t.is_finite()) || partitioning_times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SolverError::InvalidPartitioning("times must be finite and strictly increasing"));
        }
        if partitioning_times.len() - 1 > self.settings.n_threads {
            return Err(ConfigError::InvalidSetting {
                name: "n_threads",
                reason: "fewer threads than partitions",
            }
            .into());
        }
        Ok(())
    }

    /// Backward pass and search on one linearization
    ///
    /// Rejected steps redo the backward pass with the strategy's new
    /// regularization. A singular recursion or an exhausted line search is
    /// retried once with a larger regularization.
    #[allow(clippy::too_many_arguments)]
    fn improve(
        &mut self,
        lq: &LinearQuadraticApproximation,
        partitions: &[Partition],
        t0: f64,
        x0: &Vector,
        tf: f64,
        trajectory: &RolloutTrajectory,
        nominal: &PerformanceIndex,
    ) -> Result<Improvement, SolverError> {
        let merit = MeritEvaluator::new(&self.problem, &self.settings, &self.targets);
        let mut regularization = self.strategy.riccati_regularization();
        let mut retried = false;

        loop {
            self.phase = SolverPhase::BackwardPass;
            let schedule = Regularization {
                initial: regularization,
                factor: self.settings.riccati_regularization_factor,
                max: self.settings.riccati_regularization_max,
            };
            let backend = self.qp_backend.as_deref_mut();
            let solution = match run_backward_pass(&self.pool, backend, partitions, lq, &self.settings, &schedule) {
                Ok(solution) => solution,
                Err(SolverError::RiccatiSingular { time, .. }) if !retried => {
                    retried = true;
                    regularization = self.retry_regularization(regularization);
                    warn!(time, regularization, "singular Riccati recursion, retrying");
                    continue;
                }
                Err(err) => return Err(err),
            };

            // The constraint correction is not part of the expected descent
            if nominal.total_constraint_ise() < self.settings.constraint_tolerance
                && self.descent_is_negligible(solution.expected_descent, nominal.merit)
            {
                return Ok(Improvement::Negligible);
            }
            debug!(expected_descent = solution.expected_descent, regularization, "backward pass");

            let controller = policy_from_backward_pass(trajectory, &solution);
            self.phase = SolverPhase::ForwardSearch;
            let ctx = SearchContext {
                pool: &self.pool,
                rollout: &self.rollout,
                merit: &merit,
                mode_schedule: &self.mode_schedule,
                t0,
                x0,
                tf,
                controller: &controller,
                nominal,
                expected_descent: solution.expected_descent,
                min_expected_descent: self.settings.min_expected_descent,
            };

            match self.strategy.search(&ctx) {
                Ok(SearchOutcome::Accepted(step)) => return Ok(Improvement::Step(step)),
                Ok(SearchOutcome::Rejected) => {
                    regularization = self.strategy.riccati_regularization();
                    debug!(regularization, "step rejected");
                }
                Err(SearchError::LineSearchExhausted { .. }) if !retried => {
                    retried = true;
                    regularization = self.retry_regularization(regularization);
                    warn!(regularization, "line search exhausted, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn retry_regularization(&self, regularization: f64) -> f64 {
        regularization.max(self.settings.riccati_regularization_base) * self.settings.riccati_regularization_factor
    }

    /// Below the absolute floor, or predicting a relative improvement below
    /// `min_rel_cost`
    fn descent_is_negligible(&self, expected_descent: f64, merit: f64) -> bool {
        expected_descent <= self.settings.min_expected_descent
            || 0.5 * expected_descent < self.settings.min_rel_cost * merit.abs()
    }
}

fn run_backward_pass(
    pool: &ThreadPool,
    backend: Option<&mut (dyn QpBackend + 'static)>,
    partitions: &[Partition],
    lq: &LinearQuadraticApproximation,
    settings: &DdpSettings,
    regularization: &Regularization,
) -> Result<BackwardPassSolution, SolverError> {
    match backend {
        Some(backend) => backend_backward_pass(backend, lq, regularization).map_err(|err| match err {
            QpBackendError::Qp(status) => SolverError::Qp(status),
            QpBackendError::Riccati(err) => err.into(),
        }),
        None => Ok(partitioned_backward_pass(
            pool,
            partitions,
            lq,
            settings.algorithm,
            regularization,
        )?),
    }
}

/// `u = u_nom + K (x - x_nom) + α k`
fn policy_from_backward_pass(trajectory: &RolloutTrajectory, solution: &BackwardPassSolution) -> LinearController {
    let n = solution.nodes.len();
    let mut bias = Vec::with_capacity(n);
    let mut delta_bias = Vec::with_capacity(n);
    let mut gain = Vec::with_capacity(n);
    for ((state, input), node) in trajectory.state.iter().zip(&trajectory.input).zip(&solution.nodes) {
        bias.push(input - &node.gain * state);
        delta_bias.push(node.feedforward.clone());
        gain.push(node.gain.clone());
    }
    LinearController::new(trajectory.time.clone(), bias, delta_bias, gain)
}

/// Open-loop policy reproducing the inputs of `trajectory`
fn feedforward_policy(trajectory: &RolloutTrajectory) -> LinearController {
    let bias = trajectory.input.clone();
    let delta_bias = bias.iter().map(|u| Vector::zeros(u.len())).collect();
    let gain = trajectory
        .state
        .iter()
        .zip(&bias)
        .map(|(x, u): (&Vector, &Vector)| Matrix::zeros(u.len(), x.len()))
        .collect();
    LinearController::new(trajectory.time.clone(), bias, delta_bias, gain)
}
