//! Penalty functions
//!
//! Scalar penalties `p(h)` for inequality constraints `h >= 0` (or for
//! equality residuals in the quadratic case), and their composition over
//! a constraint vector.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::approximation::{ScalarFunctionQuadraticApproximation, VectorFunctionQuadraticApproximation};
use crate::{Matrix, ModelError, Vector, VectorFunctionLinearApproximation};

/// Scalar penalty with first and second derivative
pub trait PenaltyFunction: Debug + Send + Sync {
    fn value(&self, h: f64) -> f64;
    fn derivative(&self, h: f64) -> f64;
    fn second_derivative(&self, h: f64) -> f64;
}

/// Relaxed log barrier
///
/// ```text
/// p(h) = -μ ln(h)                                   h > δ
/// p(h) = -μ ln(δ) + μ/2 ((h - 2δ)/δ)² - μ/2         h <= δ
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxedBarrierPenalty {
    pub mu: f64,
    pub delta: f64,
}

impl RelaxedBarrierPenalty {
    pub fn new(mu: f64, delta: f64) -> Self {
        assert!(mu > 0.0 && delta > 0.0, "barrier parameters must be positive");
        Self { mu, delta }
    }
}

impl PenaltyFunction for RelaxedBarrierPenalty {
    fn value(&self, h: f64) -> f64 {
        if h > self.delta {
            -self.mu * h.ln()
        } else {
            let z = (h - 2.0 * self.delta) / self.delta;
            self.mu * (-self.delta.ln() + 0.5 * z * z - 0.5)
        }
    }

    fn derivative(&self, h: f64) -> f64 {
        if h > self.delta {
            -self.mu / h
        } else {
            self.mu * (h - 2.0 * self.delta) / (self.delta * self.delta)
        }
    }

    fn second_derivative(&self, h: f64) -> f64 {
        if h > self.delta {
            self.mu / (h * h)
        } else {
            self.mu / (self.delta * self.delta)
        }
    }
}

/// `p(h) = ½ scale h²`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticPenalty {
    pub scale: f64,
}

impl QuadraticPenalty {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl PenaltyFunction for QuadraticPenalty {
    fn value(&self, h: f64) -> f64 {
        0.5 * self.scale * h * h
    }

    fn derivative(&self, h: f64) -> f64 {
        self.scale * h
    }

    fn second_derivative(&self, _h: f64) -> f64 {
        self.scale
    }
}

/// Sum of scalar penalties over a constraint vector
///
/// Holds either one penalty shared by every row or one per row.
#[derive(Debug, Clone)]
pub struct MultidimensionalPenalty {
    penalties: Vec<Arc<dyn PenaltyFunction>>,
}

impl MultidimensionalPenalty {
    /// Same penalty on every row
    pub fn shared(penalty: Arc<dyn PenaltyFunction>) -> Self {
        Self {
            penalties: vec![penalty],
        }
    }

    /// One penalty per constraint row
    pub fn per_row(penalties: Vec<Arc<dyn PenaltyFunction>>) -> Self {
        assert!(!penalties.is_empty(), "at least one penalty is required");
        Self { penalties }
    }

    /// Penalties matched to the rows of `h`
    ///
    /// A shared penalty covers any row count; per-row penalties must match
    /// the constraint dimension exactly.
    fn row_penalties(&self, rows: usize) -> Result<Vec<&dyn PenaltyFunction>, ModelError> {
        match self.penalties.as_slice() {
            [shared] => Ok(vec![shared.as_ref(); rows]),
            penalties if penalties.len() == rows => Ok(penalties.iter().map(|p| p.as_ref()).collect()),
            penalties => Err(ModelError::DimensionMismatch {
                context: "penalty rows",
                expected: penalties.len(),
                got: rows,
            }),
        }
    }

    /// Total penalty `Σ p_i(h_i)`
    pub fn value(&self, h: &Vector) -> Result<f64, ModelError> {
        let penalties = self.row_penalties(h.len())?;
        Ok(penalties.iter().zip(h.iter()).map(|(p, &hi)| p.value(hi)).sum())
    }

    fn derivatives(&self, h: &Vector) -> Result<(Vector, Vector), ModelError> {
        let penalties = self.row_penalties(h.len())?;
        let d1 = Vector::from_iterator(h.len(), penalties.iter().zip(h.iter()).map(|(p, &hi)| p.derivative(hi)));
        let d2 = Vector::from_iterator(
            h.len(),
            penalties.iter().zip(h.iter()).map(|(p, &hi)| p.second_derivative(hi)),
        );
        Ok((d1, d2))
    }

    /// Chain rule on a linearized constraint (Gauss-Newton curvature)
    ///
    /// ```text
    /// ∇x = Cᵀp',  ∇u = Dᵀp',  ∇²xx = Cᵀdiag(p'')C,  ∇²uu = Dᵀdiag(p'')D,  ∇²ux = Dᵀdiag(p'')C
    /// ```
    pub fn linear_composition(
        &self,
        h: &VectorFunctionLinearApproximation,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let (d1, d2) = self.derivatives(&h.f)?;
        let diag = Matrix::from_diagonal(&d2);
        let diag_c = &diag * &h.dfdx;
        let diag_d = &diag * &h.dfdu;
        Ok(ScalarFunctionQuadraticApproximation {
            f: self.value(&h.f)?,
            dfdx: h.dfdx.transpose() * &d1,
            dfdu: h.dfdu.transpose() * &d1,
            dfdxx: h.dfdx.transpose() * &diag_c,
            dfduu: h.dfdu.transpose() * &diag_d,
            dfdux: h.dfdu.transpose() * &diag_c,
        })
    }

    /// Chain rule including the constraint curvature `Σ p'_i ∇²h_i`
    pub fn quadratic_composition(
        &self,
        h: &VectorFunctionQuadraticApproximation,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let mut result = self.linear_composition(&h.to_linear())?;
        let (d1, _) = self.derivatives(&h.f)?;
        for (i, &weight) in d1.iter().enumerate() {
            result.dfdxx += &h.dfdxx[i] * weight;
            result.dfduu += &h.dfduu[i] * weight;
            result.dfdux += &h.dfdux[i] * weight;
        }
        Ok(result)
    }
}
