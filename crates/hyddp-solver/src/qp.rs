//! Discrete LQ subproblem solvers
//!
//! ```text
//! minimize    Σ ℓ_k(x_k, u_k) + ℓ_N(x_N)
//! subject to  x_{k+1} = A_k x_k + B_k u_k + b_k,   x_0 given
//!             C_k x_k + D_k u_k + e_k = 0
//! ```
//!
//! State dimensions may change from stage to stage; in particular the first
//! block may be empty when the initial state has been condensed into `b_0`.

use thiserror::Error;
use tracing::debug;

use hyddp_core::{Matrix, ScalarFunctionQuadraticApproximation, Vector, VectorFunctionLinearApproximation};

use crate::lq::LinearQuadraticApproximation;
use crate::projection::{project, project_cost, project_dynamics, symmetrize, ConstraintProjection};
use crate::riccati::continuous::LiftedModel;
use crate::riccati::{BackwardPassSolution, CostToGo, Regularization, RiccatiError, RiccatiNode};

/// QP solver status codes
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QpStatus {
    #[error("QP iteration limit reached")]
    MaxIterations,
    #[error("QP step size below its minimum")]
    MinStep,
    #[error("numerical fault in the QP solver")]
    NumericalFault,
    #[error("inconsistent QP constraints")]
    InconsistentConstraints,
}

/// Primal solution and Riccati factors of the LQ subproblem
#[derive(Debug, Clone, PartialEq)]
pub struct QpSolution {
    /// `x_0 … x_N`
    pub state: Vec<Vector>,
    /// `u_0 … u_{N-1}`
    pub input: Vec<Vector>,
    /// `K_k` of `u_k = K_k x_k + k_k`
    pub feedback: Vec<Matrix>,
    pub feedforward: Vec<Vector>,
    /// `(S_k, s_k)` for `k = 0 … N`
    pub cost_to_go: Vec<CostToGo>,
}

/// Solver of the discrete LQ subproblem
pub trait QpBackend: Send {
    /// `dynamics` and `constraints` have one entry per stage, `cost` one
    /// more for the terminal stage.
    fn solve(
        &mut self,
        x0: &Vector,
        dynamics: &[VectorFunctionLinearApproximation],
        cost: &[ScalarFunctionQuadraticApproximation],
        constraints: &[VectorFunctionLinearApproximation],
    ) -> Result<QpSolution, QpStatus>;
}

/// Riccati-recursion reference backend
///
/// Equality constraints are eliminated by null-space projection. Every
/// stage, the first included, takes the same Riccati step from
/// `(S_{k+1}, s_{k+1})`. An empty first state block yields a `nu × 0`
/// feedback and a pure feedforward `u_0`.
#[derive(Debug, Clone, Default)]
pub struct RiccatiQpBackend {
    regularization: f64,
}

impl RiccatiQpBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `δI` to every stage Hessian
    pub fn with_regularization(mut self, regularization: f64) -> Self {
        self.regularization = regularization;
        self
    }

    /// Stage Riccati update from `(S_{k+1}, s_{k+1})`
    fn stage(
        &self,
        dynamics: &VectorFunctionLinearApproximation,
        cost: &ScalarFunctionQuadraticApproximation,
        constraint: &VectorFunctionLinearApproximation,
        next: &CostToGo,
    ) -> Result<(Matrix, Vector, CostToGo), QpStatus> {
        let projection = ConstraintProjection::new(constraint).map_err(|_| QpStatus::InconsistentConstraints)?;
        let (a, b, bias) = project_dynamics(dynamics, &projection);
        let cost = project_cost(cost, &projection);

        let nx = a.ncols();
        let s_plus = &next.gradient + &next.hessian * &bias;
        let a_t = a.transpose();

        let (gain, feedforward, cost_to_go) = if b.ncols() == 0 {
            let cost_to_go = CostToGo {
                hessian: symmetrize(&cost.dfdxx + &a_t * &next.hessian * &a),
                gradient: &cost.dfdx + &a_t * &s_plus,
            };
            (Matrix::zeros(0, nx), Vector::zeros(0), cost_to_go)
        } else {
            let b_t = b.transpose();
            let b_t_s = &b_t * &next.hessian;
            let nv = b.ncols();
            let h = &cost.dfduu + &b_t_s * &b + Matrix::identity(nv, nv) * self.regularization;
            let g_mat = &cost.dfdux + &b_t_s * &a;
            let g_vec = &cost.dfdu + &b_t * &s_plus;
            let chol = h.clone().cholesky().ok_or(QpStatus::NumericalFault)?;
            let gain = -chol.solve(&g_mat);
            let feedforward = -chol.solve(&g_vec);
            let k_t = gain.transpose();
            let cost_to_go = CostToGo {
                hessian: symmetrize(&cost.dfdxx + &a_t * &next.hessian * &a + &k_t * &g_mat),
                gradient: &cost.dfdx + &a_t * &s_plus + &k_t * &g_vec,
            };
            (gain, feedforward, cost_to_go)
        };

        let (gain, feedforward) = projection.recover(&gain, &feedforward);
        if !gain.iter().chain(feedforward.iter()).all(|v| v.is_finite()) {
            return Err(QpStatus::NumericalFault);
        }
        Ok((gain, feedforward, cost_to_go))
    }
}

impl QpBackend for RiccatiQpBackend {
    fn solve(
        &mut self,
        x0: &Vector,
        dynamics: &[VectorFunctionLinearApproximation],
        cost: &[ScalarFunctionQuadraticApproximation],
        constraints: &[VectorFunctionLinearApproximation],
    ) -> Result<QpSolution, QpStatus> {
        let n = dynamics.len();
        if cost.len() != n + 1 || constraints.len() != n || x0.len() != cost[0].nx() {
            return Err(QpStatus::InconsistentConstraints);
        }

        let mut feedback = vec![Matrix::zeros(0, 0); n];
        let mut feedforward = vec![Vector::zeros(0); n];
        let mut cost_to_go = Vec::with_capacity(n + 1);
        let terminal = CostToGo {
            hessian: symmetrize(cost[n].dfdxx.clone()),
            gradient: cost[n].dfdx.clone(),
        };
        cost_to_go.push(terminal);

        for k in (0..n).rev() {
            let next = cost_to_go.last().ok_or(QpStatus::NumericalFault)?;
            let (gain, ff, current) = self.stage(&dynamics[k], &cost[k], &constraints[k], next)?;
            feedback[k] = gain;
            feedforward[k] = ff;
            cost_to_go.push(current);
        }
        cost_to_go.reverse();

        let mut state = Vec::with_capacity(n + 1);
        let mut input = Vec::with_capacity(n);
        state.push(x0.clone());
        for k in 0..n {
            let x = &state[k];
            let u = &feedback[k] * x + &feedforward[k];
            let x_next = &dynamics[k].dfdx * x + &dynamics[k].dfdu * &u + &dynamics[k].f;
            input.push(u);
            state.push(x_next);
        }

        Ok(QpSolution {
            state,
            input,
            feedback,
            feedforward,
            cost_to_go,
        })
    }
}

/// Solve the LQ approximation with a QP backend instead of the partitioned
/// Riccati pass
///
/// Intervals are Euler-discretized; event nodes become pure jump stages.
/// Gains at event and final nodes use the instantaneous formula on the
/// backend's cost-to-go.
pub(crate) fn backend_backward_pass(
    backend: &mut dyn QpBackend,
    lq: &LinearQuadraticApproximation,
    regularization: &Regularization,
) -> Result<BackwardPassSolution, QpBackendError> {
    let nodes = &lq.nodes;
    let n = nodes.len().saturating_sub(1);
    let mut dynamics = Vec::with_capacity(n);
    let mut cost = Vec::with_capacity(n + 1);
    let mut constraints = Vec::with_capacity(n);

    for k in 0..n {
        let model = &nodes[k];
        let nx = model.state_dim();
        let nu = model.input_dim();
        let dt = nodes[k + 1].time - model.time;
        let mut stage_cost;
        if model.jump.is_some() || dt <= 0.0 {
            let jump = model.jump.clone().unwrap_or_else(|| Matrix::identity(nx, nx));
            dynamics.push(VectorFunctionLinearApproximation {
                f: Vector::zeros(jump.nrows()),
                dfdx: jump,
                dfdu: Matrix::zeros(nx, nu),
            });
            stage_cost = ScalarFunctionQuadraticApproximation::zero(nx, nu);
            constraints.push(VectorFunctionLinearApproximation::zero(0, nx, nu));
        } else {
            dynamics.push(VectorFunctionLinearApproximation {
                f: &model.dynamics.f * dt,
                dfdx: Matrix::identity(nx, nx) + &model.dynamics.dfdx * dt,
                dfdu: &model.dynamics.dfdu * dt,
            });
            stage_cost = model.cost.clone();
            stage_cost.scale(dt);
            constraints.push(model.state_input_equality.clone());
        }
        stage_cost.dfduu += Matrix::identity(nu, nu) * regularization.initial;
        cost.push(stage_cost);
    }
    cost.push(lq.terminal.clone());

    let nx0 = nodes.first().map_or(0, |m| m.state_dim());
    let solution = backend.solve(&Vector::zeros(nx0), &dynamics, &cost, &constraints)?;

    // Predicted change of the LQ objective along the QP solution
    let mut delta_cost = 0.0;
    for k in 0..n {
        delta_cost += cost[k].evaluate(&solution.state[k], &solution.input[k]) - cost[k].f;
    }
    delta_cost += cost[n].evaluate(&solution.state[n], &Vector::zeros(cost[n].nu())) - cost[n].f;
    debug!(delta_cost, "QP backend solved LQ subproblem");

    let mut riccati_nodes = Vec::with_capacity(nodes.len());
    for (k, model) in nodes.iter().enumerate() {
        let cost_to_go = solution.cost_to_go[k].clone();
        let special = k == n || model.jump.is_some() || nodes[k + 1].time <= model.time;
        let (gain, feedforward) = if special {
            let projected = project(model).map_err(|source| RiccatiError::RankDeficient {
                time: model.time,
                source,
            })?;
            let lifted = LiftedModel::new(&projected, regularization)?;
            let (gain, feedforward, _) = lifted.gains(&cost_to_go);
            (gain, feedforward)
        } else {
            (solution.feedback[k].clone(), solution.feedforward[k].clone())
        };
        riccati_nodes.push(RiccatiNode {
            time: model.time,
            gain,
            feedforward,
            cost_to_go,
        });
    }

    Ok(BackwardPassSolution {
        nodes: riccati_nodes,
        expected_descent: (-2.0 * delta_cost).max(0.0),
    })
}

/// Failures of [`backend_backward_pass`]
#[derive(Debug, Error, Clone, PartialEq)]
pub(crate) enum QpBackendError {
    #[error(transparent)]
    Qp(#[from] QpStatus),
    #[error(transparent)]
    Riccati(#[from] RiccatiError),
}
