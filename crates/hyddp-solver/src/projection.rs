//! Elimination of state-input equality constraints
//!
//! The constraint `C dx + D du + e = 0` is solved for the input:
//!
//! ```text
//! du = Pu dx + pu + Z v,   Pu = -D⁺C,  pu = -D⁺e,  D Z = 0,  ZᵀZ = I
//! ```
//!
//! which leaves an unconstrained LQ model in `(dx, v)`.

use nalgebra::SymmetricEigen;
use thiserror::Error;

use hyddp_core::{Matrix, ScalarFunctionQuadraticApproximation, Vector, VectorFunctionLinearApproximation};

use crate::lq::ModelData;

/// Relative threshold on the eigenvalues of `DᵀD`
const RANK_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("constraint input Jacobian has rank {rank} for {rows} constraints")]
pub struct RankDeficiency {
    pub rank: usize,
    pub rows: usize,
}

/// Affine input parameterization satisfying the equality constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintProjection {
    /// `Pu`, `nu × nx`
    pub feedback: Matrix,
    /// `pu`
    pub feedforward: Vector,
    /// Null-space basis `Z`, `nu × nv`
    pub nullspace: Matrix,
}

impl ConstraintProjection {
    /// Projection for `C dx + D du + e = 0`
    pub fn new(constraint: &VectorFunctionLinearApproximation) -> Result<Self, RankDeficiency> {
        let nx = constraint.dfdx.ncols();
        let nu = constraint.dfdu.ncols();
        let rows = constraint.rows();
        if rows == 0 {
            return Ok(Self::identity(nx, nu));
        }

        let d = &constraint.dfdu;
        let dtd = d.transpose() * d;
        let eigen = SymmetricEigen::new(dtd);
        let largest = eigen.eigenvalues.iter().cloned().fold(0.0, f64::max);
        let threshold = RANK_TOLERANCE * largest;
        let rank = eigen.eigenvalues.iter().filter(|l| largest > 0.0 && **l > threshold).count();
        if rank < rows {
            return Err(RankDeficiency { rank, rows });
        }

        // Full row rank: D⁺ = Dᵀ(DDᵀ)⁻¹
        let ddt = d * d.transpose();
        let Some(chol) = ddt.cholesky() else {
            return Err(RankDeficiency { rank, rows });
        };
        let pseudo_inverse = d.transpose() * chol.inverse();

        let null_columns: Vec<Vector> = eigen
            .eigenvalues
            .iter()
            .enumerate()
            .filter(|(_, l)| **l <= threshold)
            .map(|(i, _)| eigen.eigenvectors.column(i).into_owned())
            .collect();
        let nullspace = if null_columns.is_empty() {
            Matrix::zeros(nu, 0)
        } else {
            Matrix::from_columns(&null_columns)
        };

        Ok(Self {
            feedback: -(&pseudo_inverse * &constraint.dfdx),
            feedforward: -(&pseudo_inverse * &constraint.f),
            nullspace,
        })
    }

    /// Projection of an unconstrained input space
    pub fn identity(nx: usize, nu: usize) -> Self {
        Self {
            feedback: Matrix::zeros(nu, nx),
            feedforward: Vector::zeros(nu),
            nullspace: Matrix::identity(nu, nu),
        }
    }

    /// Number of free input directions
    pub fn free_dim(&self) -> usize {
        self.nullspace.ncols()
    }

    /// Map gains in `v` coordinates back to `du`
    ///
    /// `K_du = Pu + Z K`, `k_du = pu + Z k`
    pub fn recover(&self, gain: &Matrix, feedforward: &Vector) -> (Matrix, Vector) {
        (
            &self.feedback + &self.nullspace * gain,
            &self.feedforward + &self.nullspace * feedforward,
        )
    }
}

/// Unconstrained LQ model in `(dx, v)`
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedModel {
    pub time: f64,
    /// `Ã = A + B Pu`
    pub a: Matrix,
    /// `B̃ = B Z`
    pub b: Matrix,
    /// `b̃ = b + B pu`
    pub bias: Vector,
    /// Cost expansion with `dfdxx = Q̃`, `dfduu = R̃`, `dfdux = P̃`,
    /// `dfdx = q̃`, `dfdu = r̃`
    pub cost: ScalarFunctionQuadraticApproximation,
    pub projection: ConstraintProjection,
    pub jump: Option<Matrix>,
}

/// Project the node model onto the constraint manifold
pub fn project(model: &ModelData) -> Result<ProjectedModel, RankDeficiency> {
    let projection = ConstraintProjection::new(&model.state_input_equality)?;
    let (a, b, bias) = project_dynamics(&model.dynamics, &projection);
    let cost = project_cost(&model.cost, &projection);
    Ok(ProjectedModel {
        time: model.time,
        a,
        b,
        bias,
        cost,
        projection,
        jump: model.jump.clone(),
    })
}

/// `(Ã, B̃, b̃)` of an affine model `A dx + B du + b`
pub fn project_dynamics(
    dynamics: &VectorFunctionLinearApproximation,
    projection: &ConstraintProjection,
) -> (Matrix, Matrix, Vector) {
    let b = &dynamics.dfdu;
    (
        &dynamics.dfdx + b * &projection.feedback,
        b * &projection.nullspace,
        &dynamics.f + b * &projection.feedforward,
    )
}

/// Cost expansion in `(dx, v)`
pub fn project_cost(
    cost: &ScalarFunctionQuadraticApproximation,
    projection: &ConstraintProjection,
) -> ScalarFunctionQuadraticApproximation {
    let pu = &projection.feedback;
    let pu_t = pu.transpose();
    let pu_vec = &projection.feedforward;
    let z_t = projection.nullspace.transpose();
    let r = &cost.dfduu;
    let p = &cost.dfdux;

    let r_pu = r * pu;
    let r_pu_vec = r * pu_vec;

    let q_mat = &cost.dfdxx + &pu_t * &r_pu + &pu_t * p + p.transpose() * pu;
    let q_vec = &cost.dfdx + &pu_t * &cost.dfdu + &pu_t * &r_pu_vec + p.transpose() * pu_vec;
    let f = cost.f + cost.dfdu.dot(pu_vec) + 0.5 * pu_vec.dot(&r_pu_vec);

    ScalarFunctionQuadraticApproximation {
        f,
        dfdx: q_vec,
        dfdu: &z_t * (&cost.dfdu + &r_pu_vec),
        dfdxx: symmetrize(q_mat),
        dfduu: symmetrize(&z_t * r * &projection.nullspace),
        dfdux: &z_t * (&r_pu + p),
    }
}

pub(crate) fn symmetrize(m: Matrix) -> Matrix {
    (&m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constraint() -> VectorFunctionLinearApproximation {
        // u0 + u1 = x0 - 1
        VectorFunctionLinearApproximation {
            f: Vector::from_vec(vec![1.0]),
            dfdx: Matrix::from_row_slice(1, 2, &[-1.0, 0.0]),
            dfdu: Matrix::from_row_slice(1, 2, &[1.0, 1.0]),
        }
    }

    #[test]
    fn test_projection_satisfies_constraint() {
        let con = constraint();
        let proj = ConstraintProjection::new(&con).unwrap();
        assert_eq!(proj.free_dim(), 1);

        // D Z = 0 and ZᵀZ = I
        assert_relative_eq!((&con.dfdu * &proj.nullspace).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            proj.nullspace.transpose() * &proj.nullspace,
            Matrix::identity(1, 1),
            epsilon = 1e-12
        );

        // Any (dx, v) satisfies C dx + D du + e = 0
        let dx = Vector::from_vec(vec![0.7, -2.0]);
        let v = Vector::from_vec(vec![3.0]);
        let du = &proj.feedback * &dx + &proj.feedforward + &proj.nullspace * &v;
        assert_relative_eq!(con.evaluate(&dx, &du)[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rank_deficient_constraint() {
        let con = VectorFunctionLinearApproximation {
            f: Vector::zeros(2),
            dfdx: Matrix::zeros(2, 2),
            dfdu: Matrix::from_row_slice(2, 2, &[1.0, 1.0, 2.0, 2.0]),
        };
        assert_eq!(ConstraintProjection::new(&con), Err(RankDeficiency { rank: 1, rows: 2 }));
    }

    #[test]
    fn test_projected_cost_matches_substitution() {
        let con = constraint();
        let proj = ConstraintProjection::new(&con).unwrap();
        let mut cost = ScalarFunctionQuadraticApproximation::zero(2, 2);
        cost.f = 0.3;
        cost.dfdx = Vector::from_vec(vec![1.0, -1.0]);
        cost.dfdu = Vector::from_vec(vec![0.5, 2.0]);
        cost.dfdxx = Matrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 1.0]);
        cost.dfduu = Matrix::from_row_slice(2, 2, &[3.0, 0.2, 0.2, 1.0]);
        cost.dfdux = Matrix::from_row_slice(2, 2, &[0.1, 0.0, 0.4, -0.3]);
        let projected = project_cost(&cost, &proj);

        let dx = Vector::from_vec(vec![0.2, -0.4]);
        let v = Vector::from_vec(vec![1.5]);
        let du = &proj.feedback * &dx + &proj.feedforward + &proj.nullspace * &v;
        assert_relative_eq!(projected.evaluate(&dx, &v), cost.evaluate(&dx, &du), epsilon = 1e-10);
    }

    #[test]
    fn test_unconstrained_projection_is_identity() {
        let con = VectorFunctionLinearApproximation::zero(0, 2, 1);
        let proj = ConstraintProjection::new(&con).unwrap();
        assert_eq!(proj.nullspace, Matrix::identity(1, 1));
        let (k, ff) = proj.recover(&Matrix::from_row_slice(1, 2, &[1.0, 2.0]), &Vector::from_vec(vec![3.0]));
        assert_eq!(k, Matrix::from_row_slice(1, 2, &[1.0, 2.0]));
        assert_eq!(ff, Vector::from_vec(vec![3.0]));
    }
}
