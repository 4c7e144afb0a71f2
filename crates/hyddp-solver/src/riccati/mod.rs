//! Backward Riccati recursion
//!
//! - [`discrete`]: Euler-discretized recursion (ILQR)
//! - [`continuous`]: Riccati differential equations (SLQ) and the
//!   instantaneous gain formula used at event and final nodes
//! - [`partition`]: partitioned, multi-threaded driver
//!
//! Every node produces a feedback gain and feedforward in `du`
//! coordinates together with the quadratic cost-to-go `(S, s)`.

pub mod continuous;
pub mod discrete;
pub mod partition;

pub use partition::*;

use nalgebra::{Cholesky, Dyn};
use thiserror::Error;

use hyddp_core::{Matrix, Vector};

use crate::config::Algorithm;
use crate::projection::{project, symmetrize, ProjectedModel, RankDeficiency};
use crate::lq::LinearQuadraticApproximation;

/// Floor applied when growing a zero regularization
const MIN_REGULARIZATION: f64 = 1e-12;

/// Backward pass failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiccatiError {
    #[error("Riccati recursion is singular at t = {time} (regularization {regularization:e})")]
    Singular { time: f64, regularization: f64 },
    #[error("rank-deficient state-input constraint at t = {time}: {source}")]
    RankDeficient { time: f64, source: RankDeficiency },
    #[error("backward pass aborted by a neighbouring partition")]
    Aborted,
}

/// Regularization schedule of `H + δI`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularization {
    /// First `δ` tried at every node
    pub initial: f64,
    /// Growth factor after a failed factorization
    pub factor: f64,
    /// Ceiling beyond which the node is singular
    pub max: f64,
}

/// Quadratic cost-to-go `V(dx) = ½ dxᵀS dx + sᵀdx`
#[derive(Debug, Clone, PartialEq)]
pub struct CostToGo {
    pub hessian: Matrix,
    pub gradient: Vector,
}

/// Backward pass output of one node
#[derive(Debug, Clone, PartialEq)]
pub struct RiccatiNode {
    pub time: f64,
    /// `K`, `nu × nx`
    pub gain: Matrix,
    /// `k`
    pub feedforward: Vector,
    pub cost_to_go: CostToGo,
}

/// Backward pass output of the whole trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct BackwardPassSolution {
    pub nodes: Vec<RiccatiNode>,
    /// `Σ w_k gᵀH⁻¹g`
    pub expected_descent: f64,
}

/// Cholesky factor of `h + δI`, growing `δ` until it succeeds
pub(crate) fn regularized_cholesky(
    h: &Matrix,
    regularization: &Regularization,
    time: f64,
) -> Result<Cholesky<f64, Dyn>, RiccatiError> {
    let n = h.nrows();
    let mut delta = regularization.initial;
    loop {
        let shifted = h + Matrix::identity(n, n) * delta;
        if let Some(chol) = shifted.cholesky() {
            return Ok(chol);
        }
        delta = (delta * regularization.factor).max(MIN_REGULARIZATION);
        if delta > regularization.max {
            return Err(RiccatiError::Singular {
                time,
                regularization: delta,
            });
        }
    }
}

/// Project the models of `range` (plus the node following it, when any)
pub(crate) fn project_range(
    lq: &LinearQuadraticApproximation,
    begin: usize,
    end: usize,
) -> Result<Vec<ProjectedModel>, RiccatiError> {
    let last = (end + 1).min(lq.nodes.len());
    lq.nodes[begin..last]
        .iter()
        .map(|model| {
            project(model).map_err(|source| RiccatiError::RankDeficient {
                time: model.time,
                source,
            })
        })
        .collect()
}

/// Output of one partition, in node order
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PartitionSolution {
    pub nodes: Vec<RiccatiNode>,
    pub descent: Vec<f64>,
}

/// Strictly backward recursion over the nodes `[begin, end)`
///
/// `models` holds the projected models of `begin..end` followed by the model
/// of node `end` when the partition is not the last one. `downstream` is the
/// cost-to-go of node `end`, or `None` for the last partition, which starts
/// from the terminal cost.
pub(crate) fn backward_recursion(
    algorithm: Algorithm,
    lq: &LinearQuadraticApproximation,
    models: &[ProjectedModel],
    num_nodes: usize,
    downstream: Option<CostToGo>,
    regularization: &Regularization,
) -> Result<PartitionSolution, RiccatiError> {
    let mut nodes = Vec::with_capacity(num_nodes);
    let mut descent = Vec::with_capacity(num_nodes);

    let (mut next, mut remaining) = match downstream {
        Some(cost_to_go) => (cost_to_go, num_nodes),
        None => {
            // Final node
            let last = num_nodes - 1;
            let terminal = CostToGo {
                hessian: symmetrize(lq.terminal.dfdxx.clone()),
                gradient: lq.terminal.dfdx.clone(),
            };
            let lifted = continuous::LiftedModel::new(&models[last], regularization)?;
            let (gain, feedforward, _) = lifted.gains(&terminal);
            nodes.push(RiccatiNode {
                time: models[last].time,
                gain,
                feedforward,
                cost_to_go: terminal.clone(),
            });
            descent.push(0.0);
            (terminal, last)
        }
    };

    while remaining > 0 {
        let k = remaining - 1;
        let model = &models[k];
        let model_next = &models[k + 1];
        let dt = model_next.time - model.time;

        let (node, weight) = if model.jump.is_some() || dt <= 0.0 {
            let cost_to_go = match &model.jump {
                Some(jump) => CostToGo {
                    hessian: symmetrize(jump.transpose() * &next.hessian * jump),
                    gradient: jump.transpose() * &next.gradient,
                },
                None => next.clone(),
            };
            let lifted = continuous::LiftedModel::new(model, regularization)?;
            let (gain, feedforward, _) = lifted.gains(&cost_to_go);
            (
                RiccatiNode {
                    time: model.time,
                    gain,
                    feedforward,
                    cost_to_go,
                },
                0.0,
            )
        } else {
            match algorithm {
                Algorithm::Ilqr => discrete::riccati_step(model, dt, &next, regularization)?,
                Algorithm::Slq => {
                    let lifted = continuous::LiftedModel::new(model, regularization)?;
                    let lifted_next = continuous::LiftedModel::new(model_next, regularization)?;
                    let cost_to_go = continuous::integrate_interval(&lifted, &lifted_next, dt, &next);
                    let (gain, feedforward, term) = lifted.gains(&cost_to_go);
                    (
                        RiccatiNode {
                            time: model.time,
                            gain,
                            feedforward,
                            cost_to_go,
                        },
                        dt * term,
                    )
                }
            }
        };

        next = node.cost_to_go.clone();
        nodes.push(node);
        descent.push(weight);
        remaining = k;
    }

    nodes.reverse();
    descent.reverse();
    Ok(PartitionSolution { nodes, descent })
}
