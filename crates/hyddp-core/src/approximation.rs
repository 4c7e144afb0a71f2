//! Function approximations
//!
//! Value plus first/second-order expansions of scalar and vector
//! functions of `(x, u)` around a point. All model collaborators
//! report their derivatives through these types.

use std::ops::AddAssign;

use crate::{Matrix, Vector};

/// Second-order expansion of a scalar function `f(x, u)`
///
/// ```text
/// f(x + dx, u + du) ≈ f + dfdxᵀdx + dfduᵀdu
///                     + ½ dxᵀ dfdxx dx + ½ duᵀ dfduu du + duᵀ dfdux dx
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarFunctionQuadraticApproximation {
    pub f: f64,
    pub dfdx: Vector,
    pub dfdu: Vector,
    pub dfdxx: Matrix,
    pub dfduu: Matrix,
    /// Cross term, `nu × nx`
    pub dfdux: Matrix,
}

impl ScalarFunctionQuadraticApproximation {
    /// Zero approximation of the given dimensions
    pub fn zero(nx: usize, nu: usize) -> Self {
        Self {
            f: 0.0,
            dfdx: Vector::zeros(nx),
            dfdu: Vector::zeros(nu),
            dfdxx: Matrix::zeros(nx, nx),
            dfduu: Matrix::zeros(nu, nu),
            dfdux: Matrix::zeros(nu, nx),
        }
    }

    /// State dimension
    pub fn nx(&self) -> usize {
        self.dfdx.len()
    }

    /// Input dimension
    pub fn nu(&self) -> usize {
        self.dfdu.len()
    }

    /// Multiply every term by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.f *= factor;
        self.dfdx *= factor;
        self.dfdu *= factor;
        self.dfdxx *= factor;
        self.dfduu *= factor;
        self.dfdux *= factor;
    }

    /// Evaluate the expansion at a deviation `(dx, du)`
    pub fn evaluate(&self, dx: &Vector, du: &Vector) -> f64 {
        self.f
            + self.dfdx.dot(dx)
            + self.dfdu.dot(du)
            + 0.5 * dx.dot(&(&self.dfdxx * dx))
            + 0.5 * du.dot(&(&self.dfduu * du))
            + du.dot(&(&self.dfdux * dx))
    }
}

impl AddAssign<&ScalarFunctionQuadraticApproximation> for ScalarFunctionQuadraticApproximation {
    fn add_assign(&mut self, rhs: &ScalarFunctionQuadraticApproximation) {
        self.f += rhs.f;
        self.dfdx += &rhs.dfdx;
        self.dfdu += &rhs.dfdu;
        self.dfdxx += &rhs.dfdxx;
        self.dfduu += &rhs.dfduu;
        self.dfdux += &rhs.dfdux;
    }
}

/// First-order expansion of a vector function `f(x, u)`
///
/// `f(x + dx, u + du) ≈ f + dfdx dx + dfdu du`
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFunctionLinearApproximation {
    pub f: Vector,
    pub dfdx: Matrix,
    pub dfdu: Matrix,
}

impl VectorFunctionLinearApproximation {
    /// Zero approximation with `nv` rows
    pub fn zero(nv: usize, nx: usize, nu: usize) -> Self {
        Self {
            f: Vector::zeros(nv),
            dfdx: Matrix::zeros(nv, nx),
            dfdu: Matrix::zeros(nv, nu),
        }
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.f.len()
    }

    /// Evaluate the expansion at a deviation `(dx, du)`
    pub fn evaluate(&self, dx: &Vector, du: &Vector) -> Vector {
        &self.f + &self.dfdx * dx + &self.dfdu * du
    }
}

/// Second-order expansion of a vector function `f(x, u)`
///
/// Hessians are stored per output component.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFunctionQuadraticApproximation {
    pub f: Vector,
    pub dfdx: Matrix,
    pub dfdu: Matrix,
    pub dfdxx: Vec<Matrix>,
    pub dfduu: Vec<Matrix>,
    pub dfdux: Vec<Matrix>,
}

impl VectorFunctionQuadraticApproximation {
    /// Zero approximation with `nv` rows
    pub fn zero(nv: usize, nx: usize, nu: usize) -> Self {
        Self {
            f: Vector::zeros(nv),
            dfdx: Matrix::zeros(nv, nx),
            dfdu: Matrix::zeros(nv, nu),
            dfdxx: vec![Matrix::zeros(nx, nx); nv],
            dfduu: vec![Matrix::zeros(nu, nu); nv],
            dfdux: vec![Matrix::zeros(nu, nx); nv],
        }
    }

    /// Drop the curvature terms
    pub fn to_linear(&self) -> VectorFunctionLinearApproximation {
        VectorFunctionLinearApproximation {
            f: self.f.clone(),
            dfdx: self.dfdx.clone(),
            dfdu: self.dfdu.clone(),
        }
    }
}
