//! Discrete-time Riccati recursion (ILQR)
//!
//! The projected model is discretized with explicit Euler over the node
//! interval, `A_d = I + Ã dt`, `B_d = B̃ dt`, and the stage cost is scaled
//! by `dt`:
//!
//! ```text
//! H = R + BᵀSB       G = P + BᵀSA       g = r + Bᵀ(s + Sb)
//! K = -H⁻¹G          k = -H⁻¹g
//! S = Q + AᵀSA + KᵀHK + KᵀG + GᵀK
//! s = q + Aᵀ(s + Sb) + KᵀHk + Kᵀg + Gᵀk
//! ```

use hyddp_core::{Matrix, Vector};

use crate::projection::{symmetrize, ProjectedModel};
use crate::riccati::{regularized_cholesky, CostToGo, Regularization, RiccatiError, RiccatiNode};

/// Euler-discretized projected model
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteModel {
    pub a: Matrix,
    pub b: Matrix,
    pub bias: Vector,
    pub q_mat: Matrix,
    pub r_mat: Matrix,
    pub p_mat: Matrix,
    pub q_vec: Vector,
    pub r_vec: Vector,
}

impl DiscreteModel {
    pub fn new(model: &ProjectedModel, dt: f64) -> Self {
        let nx = model.a.nrows();
        Self {
            a: Matrix::identity(nx, nx) + &model.a * dt,
            b: &model.b * dt,
            bias: &model.bias * dt,
            q_mat: &model.cost.dfdxx * dt,
            r_mat: &model.cost.dfduu * dt,
            p_mat: &model.cost.dfdux * dt,
            q_vec: &model.cost.dfdx * dt,
            r_vec: &model.cost.dfdu * dt,
        }
    }
}

/// One backward step from node `k + 1` to node `k`
///
/// Returns the node output in `du` coordinates and its expected descent
/// contribution `gᵀH⁻¹g`.
pub fn riccati_step(
    model: &ProjectedModel,
    dt: f64,
    next: &CostToGo,
    regularization: &Regularization,
) -> Result<(RiccatiNode, f64), RiccatiError> {
    let d = DiscreteModel::new(model, dt);
    let s_mat = &next.hessian;
    let s_vec = &next.gradient;
    let s_plus = s_vec + s_mat * &d.bias;
    let a_t = d.a.transpose();

    let nv = d.b.ncols();
    let (gain, feedforward, cost_to_go, descent) = if nv == 0 {
        let nx = d.a.nrows();
        let cost_to_go = CostToGo {
            hessian: symmetrize(&d.q_mat + &a_t * s_mat * &d.a),
            gradient: &d.q_vec + &a_t * &s_plus,
        };
        (Matrix::zeros(0, nx), Vector::zeros(0), cost_to_go, 0.0)
    } else {
        let b_t = d.b.transpose();
        let b_t_s = &b_t * s_mat;
        let h = &d.r_mat + &b_t_s * &d.b;
        let g_mat = &d.p_mat + &b_t_s * &d.a;
        let g_vec = &d.r_vec + &b_t * &s_plus;

        let chol = regularized_cholesky(&h, regularization, model.time)?;
        let h_reg = chol.l() * chol.l().transpose();
        let gain = -chol.solve(&g_mat);
        let feedforward = -chol.solve(&g_vec);

        let k_t = gain.transpose();
        let g_mat_t = g_mat.transpose();
        let k_t_h = &k_t * &h_reg;
        let hessian = &d.q_mat + &a_t * s_mat * &d.a + &k_t_h * &gain + &k_t * &g_mat + &g_mat_t * &gain;
        let gradient = &d.q_vec + &a_t * &s_plus + &k_t_h * &feedforward + &k_t * &g_vec + &g_mat_t * &feedforward;
        let descent = -g_vec.dot(&feedforward);

        (
            gain,
            feedforward,
            CostToGo {
                hessian: symmetrize(hessian),
                gradient,
            },
            descent,
        )
    };

    let (gain, feedforward) = model.projection.recover(&gain, &feedforward);
    Ok((
        RiccatiNode {
            time: model.time,
            gain,
            feedforward,
            cost_to_go,
        },
        descent,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ConstraintProjection;
    use approx::assert_relative_eq;
    use hyddp_core::ScalarFunctionQuadraticApproximation;

    fn model() -> ProjectedModel {
        let mut cost = ScalarFunctionQuadraticApproximation::zero(1, 1);
        cost.dfdxx[(0, 0)] = 1.0;
        cost.dfduu[(0, 0)] = 1.0;
        cost.dfdu[0] = 0.5;
        ProjectedModel {
            time: 0.0,
            a: Matrix::zeros(1, 1),
            b: Matrix::from_element(1, 1, 1.0),
            bias: Vector::zeros(1),
            cost,
            projection: ConstraintProjection::identity(1, 1),
            jump: None,
        }
    }

    fn regularization() -> Regularization {
        Regularization {
            initial: 0.0,
            factor: 10.0,
            max: 1e6,
        }
    }

    #[test]
    fn test_scalar_step() {
        // dt = 1: A = 1, B = 1, Q = R = 1, r = 0.5, S' = 1, s' = 0
        let next = CostToGo {
            hessian: Matrix::from_element(1, 1, 1.0),
            gradient: Vector::zeros(1),
        };
        let (node, descent) = riccati_step(&model(), 1.0, &next, &regularization()).unwrap();
        // H = 2, G = 1, g = 0.5
        assert_relative_eq!(node.gain[(0, 0)], -0.5, epsilon = 1e-12);
        assert_relative_eq!(node.feedforward[0], -0.25, epsilon = 1e-12);
        // S = 1 + 1 - G²/H
        assert_relative_eq!(node.cost_to_go.hessian[(0, 0)], 1.5, epsilon = 1e-12);
        // s = 0 - G g / H
        assert_relative_eq!(node.cost_to_go.gradient[0], -0.25, epsilon = 1e-12);
        assert_relative_eq!(descent, 0.125, epsilon = 1e-12);
    }

    #[test]
    fn test_step_is_idempotent() {
        let next = CostToGo {
            hessian: Matrix::from_element(1, 1, 2.0),
            gradient: Vector::from_vec(vec![0.3]),
        };
        let first = riccati_step(&model(), 0.1, &next, &regularization()).unwrap();
        let second = riccati_step(&model(), 0.1, &next, &regularization()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fully_constrained_input() {
        let mut m = model();
        m.projection = ConstraintProjection {
            feedback: Matrix::from_element(1, 1, -2.0),
            feedforward: Vector::from_vec(vec![1.0]),
            nullspace: Matrix::zeros(1, 0),
        };
        m.b = Matrix::zeros(1, 0);
        m.cost = ScalarFunctionQuadraticApproximation::zero(1, 0);
        let next = CostToGo {
            hessian: Matrix::from_element(1, 1, 1.0),
            gradient: Vector::zeros(1),
        };
        let (node, descent) = riccati_step(&m, 0.1, &next, &regularization()).unwrap();
        assert_eq!(node.gain, Matrix::from_element(1, 1, -2.0));
        assert_eq!(node.feedforward, Vector::from_vec(vec![1.0]));
        assert_eq!(descent, 0.0);
    }
}
