//! Continuous-time Riccati equations (SLQ)
//!
//! ```text
//! -Ṡ = Q + AᵀS + SA - (P + BᵀS)ᵀ R⁻¹ (P + BᵀS)
//! -ṡ = q + Aᵀs + S b - (P + BᵀS)ᵀ R⁻¹ (r + Bᵀs)
//! ```
//!
//! Input-side terms are lifted back to `du` coordinates through the
//! null-space projector, e.g. `W = Z (R̃ + δI)⁻¹ Zᵀ`, so that models of
//! neighbouring nodes can be interpolated even when their null-space
//! bases differ.

use hyddp_core::{Matrix, Vector};

use crate::projection::{symmetrize, ProjectedModel};
use crate::riccati::{regularized_cholesky, CostToGo, Regularization, RiccatiError};

/// Projected node model with basis-independent input terms
#[derive(Debug, Clone, PartialEq)]
pub struct LiftedModel {
    pub time: f64,
    /// `Ã`
    pub a: Matrix,
    /// `b̃`
    pub bias: Vector,
    /// `Q̃`
    pub q_mat: Matrix,
    /// `q̃`
    pub q_vec: Vector,
    /// `B̃ Zᵀ`, `nx × nu`
    pub b: Matrix,
    /// `Z P̃`, `nu × nx`
    pub p: Matrix,
    /// `Z r̃`
    pub r: Vector,
    /// `Z (R̃ + δI)⁻¹ Zᵀ`
    pub w: Matrix,
    /// `Pu`
    pub constraint_feedback: Matrix,
    /// `pu`
    pub constraint_feedforward: Vector,
}

impl LiftedModel {
    pub fn new(model: &ProjectedModel, regularization: &Regularization) -> Result<Self, RiccatiError> {
        let z = &model.projection.nullspace;
        let nu = z.nrows();
        let w = if z.ncols() == 0 {
            Matrix::zeros(nu, nu)
        } else {
            let chol = regularized_cholesky(&model.cost.dfduu, regularization, model.time)?;
            z * chol.inverse() * z.transpose()
        };
        Ok(Self {
            time: model.time,
            a: model.a.clone(),
            bias: model.bias.clone(),
            q_mat: model.cost.dfdxx.clone(),
            q_vec: model.cost.dfdx.clone(),
            b: &model.b * z.transpose(),
            p: z * &model.cost.dfdux,
            r: z * &model.cost.dfdu,
            w: symmetrize(w),
            constraint_feedback: model.projection.feedback.clone(),
            constraint_feedforward: model.projection.feedforward.clone(),
        })
    }

    /// `(1 - λ)·self + λ·other`
    pub fn interpolate(&self, other: &Self, lambda: f64) -> Self {
        let mix_m = |x: &Matrix, y: &Matrix| x * (1.0 - lambda) + y * lambda;
        let mix_v = |x: &Vector, y: &Vector| x * (1.0 - lambda) + y * lambda;
        Self {
            time: self.time * (1.0 - lambda) + other.time * lambda,
            a: mix_m(&self.a, &other.a),
            bias: mix_v(&self.bias, &other.bias),
            q_mat: mix_m(&self.q_mat, &other.q_mat),
            q_vec: mix_v(&self.q_vec, &other.q_vec),
            b: mix_m(&self.b, &other.b),
            p: mix_m(&self.p, &other.p),
            r: mix_v(&self.r, &other.r),
            w: mix_m(&self.w, &other.w),
            constraint_feedback: mix_m(&self.constraint_feedback, &other.constraint_feedback),
            constraint_feedforward: mix_v(&self.constraint_feedforward, &other.constraint_feedforward),
        }
    }

    /// Instantaneous gains for a given cost-to-go
    ///
    /// Returns `(K, k, gᵀH⁻¹g)` with `K = Pu - W(P + BᵀS)`,
    /// `k = pu - W(r + Bᵀs)`.
    pub fn gains(&self, cost_to_go: &CostToGo) -> (Matrix, Vector, f64) {
        let n_mat = &self.p + self.b.transpose() * &cost_to_go.hessian;
        let n_vec = &self.r + self.b.transpose() * &cost_to_go.gradient;
        let w_n_vec = &self.w * &n_vec;
        let gain = &self.constraint_feedback - &self.w * n_mat;
        let feedforward = &self.constraint_feedforward - &w_n_vec;
        let descent = n_vec.dot(&w_n_vec);
        (gain, feedforward, descent)
    }

    /// Backward-time derivative `(-Ṡ, -ṡ)`
    fn riccati_rhs(&self, cost_to_go: &CostToGo) -> CostToGo {
        let s_mat = &cost_to_go.hessian;
        let s_vec = &cost_to_go.gradient;
        let n_mat = &self.p + self.b.transpose() * s_mat;
        let n_vec = &self.r + self.b.transpose() * s_vec;
        let n_t_w = n_mat.transpose() * &self.w;

        let a_t_s = self.a.transpose() * s_mat;
        let hessian = &self.q_mat + &a_t_s + a_t_s.transpose() - &n_t_w * &n_mat;
        let gradient = &self.q_vec + self.a.transpose() * s_vec + s_mat * &self.bias - &n_t_w * &n_vec;
        CostToGo { hessian, gradient }
    }
}

/// One RK4 step of the Riccati equations from `t_{k+1}` back to `t_k`
///
/// The model is interpolated linearly between the two nodes.
pub fn integrate_interval(model: &LiftedModel, model_next: &LiftedModel, dt: f64, next: &CostToGo) -> CostToGo {
    let mid = model_next.interpolate(model, 0.5);
    let axpy = |base: &CostToGo, slope: &CostToGo, h: f64| CostToGo {
        hessian: &base.hessian + &slope.hessian * h,
        gradient: &base.gradient + &slope.gradient * h,
    };

    let k1 = model_next.riccati_rhs(next);
    let k2 = mid.riccati_rhs(&axpy(next, &k1, 0.5 * dt));
    let k3 = mid.riccati_rhs(&axpy(next, &k2, 0.5 * dt));
    let k4 = model.riccati_rhs(&axpy(next, &k3, dt));

    let h6 = dt / 6.0;
    let hessian = &next.hessian + (&k1.hessian + &k2.hessian * 2.0 + &k3.hessian * 2.0 + &k4.hessian) * h6;
    let gradient = &next.gradient + (&k1.gradient + &k2.gradient * 2.0 + &k3.gradient * 2.0 + &k4.gradient) * h6;
    CostToGo {
        hessian: symmetrize(hessian),
        gradient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ConstraintProjection;
    use approx::assert_relative_eq;
    use hyddp_core::ScalarFunctionQuadraticApproximation;

    fn scalar_model(time: f64, a: f64, b: f64, q: f64, r: f64) -> ProjectedModel {
        let mut cost = ScalarFunctionQuadraticApproximation::zero(1, 1);
        cost.dfdxx[(0, 0)] = q;
        cost.dfduu[(0, 0)] = r;
        ProjectedModel {
            time,
            a: Matrix::from_element(1, 1, a),
            b: Matrix::from_element(1, 1, b),
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
    fn test_converges_to_algebraic_riccati_solution() {
        // ẋ = u, L = ½x² + ½u²  =>  S∞ = 1, K = -1
        let model = LiftedModel::new(&scalar_model(0.0, 0.0, 1.0, 1.0, 1.0), &regularization()).unwrap();
        let mut cost_to_go = CostToGo {
            hessian: Matrix::zeros(1, 1),
            gradient: Vector::zeros(1),
        };
        for _ in 0..2000 {
            cost_to_go = integrate_interval(&model, &model, 0.01, &cost_to_go);
        }
        assert_relative_eq!(cost_to_go.hessian[(0, 0)], 1.0, epsilon = 1e-8);
        let (gain, feedforward, descent) = model.gains(&cost_to_go);
        assert_relative_eq!(gain[(0, 0)], -1.0, epsilon = 1e-8);
        assert_relative_eq!(feedforward[0], 0.0);
        assert_relative_eq!(descent, 0.0);
    }

    #[test]
    fn test_rk4_matches_closed_form() {
        // ẋ = u, L = ½u², S(T) = 1  =>  S(t) = 1 / (1 + T - t)
        let model = LiftedModel::new(&scalar_model(0.0, 0.0, 1.0, 0.0, 1.0), &regularization()).unwrap();
        let mut cost_to_go = CostToGo {
            hessian: Matrix::from_element(1, 1, 1.0),
            gradient: Vector::zeros(1),
        };
        for _ in 0..100 {
            cost_to_go = integrate_interval(&model, &model, 0.01, &cost_to_go);
        }
        assert_relative_eq!(cost_to_go.hessian[(0, 0)], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_input_cost() {
        let reg = Regularization {
            initial: 1e-9,
            factor: 10.0,
            max: 1.0,
        };
        let result = LiftedModel::new(&scalar_model(0.3, 0.0, 1.0, 1.0, -100.0), &reg);
        assert!(matches!(result, Err(RiccatiError::Singular { time, .. }) if time == 0.3));
    }
}
