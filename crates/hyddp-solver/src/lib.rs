//! # hyddp-solver
//!
//! Differential dynamic programming (SLQ / ILQR) for hybrid systems built
//! on the models of `hyddp-core`.
//!
//! Each iteration solves
//!
//! ```text
//! minimize    ∫ L(t, x, u) dt + Φ(x(tf))
//! subject to  ẋ = f(t, x, u)                   (flow, per mode)
//!             x⁺ = J(t, x⁻)                     (at event times)
//!             g(t, x, u) = 0,  h(t, x) = 0,  h_f(x(tf)) = 0
//! ```
//!
//! approximately around the nominal rollout and improves it with a line
//! search or Levenberg-Marquardt step.
//!
//! ## Modules
//!
//! - [`config`]: Solver settings
//! - [`problem`]: Problem bundle (dynamics, cost, constraints)
//! - [`lq`]: Linear-quadratic approximation along a rollout
//! - [`projection`]: Elimination of state-input equality constraints
//! - [`riccati`]: Partitioned backward Riccati pass
//! - [`search`]: Line search and Levenberg-Marquardt
//! - [`merit`]: Merit function of a rollout
//! - [`qp`]: Discrete LQ subproblem backends
//! - [`solver`]: The DDP orchestrator

pub mod config;
pub mod problem;
pub mod lq;
pub mod projection;
pub mod riccati;
pub mod search;
pub mod merit;
pub mod qp;
pub mod solver;

// Re-exports
pub use config::{Algorithm, DdpSettings, SearchStrategyType};
pub use problem::OptimalControlProblem;
pub use qp::{QpBackend, QpSolution, QpStatus, RiccatiQpBackend};
pub use solver::{DdpSolver, SolveStatus, SolveSummary, SolverError, SolverPhase};
