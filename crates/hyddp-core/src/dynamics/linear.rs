//! Linear time-invariant dynamics
//!
//! `ẋ = A x + B u + b`

use crate::approximation::VectorFunctionLinearApproximation;
use crate::dynamics::SystemDynamics;
use crate::{Matrix, ModelError, Vector};

/// Affine time-invariant system
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystemDynamics {
    pub a: Matrix,
    pub b: Matrix,
    pub bias: Vector,
}

impl LinearSystemDynamics {
    /// Create `ẋ = A x + B u`
    ///
    /// # Panics
    /// If `A` is not square or `B` has a different number of rows.
    pub fn new(a: Matrix, b: Matrix) -> Self {
        assert!(a.is_square(), "A must be square");
        assert_eq!(a.nrows(), b.nrows(), "A and B must have the same number of rows");
        let nx = a.nrows();
        Self {
            a,
            b,
            bias: Vector::zeros(nx),
        }
    }

    /// Add a constant drift term `b`
    pub fn with_bias(mut self, bias: Vector) -> Self {
        assert_eq!(bias.len(), self.a.nrows(), "bias must have state dimension");
        self.bias = bias;
        self
    }

    fn check(&self, state: &Vector, input: &Vector) -> Result<(), ModelError> {
        if state.len() != self.state_dim() {
            return Err(ModelError::DimensionMismatch {
                context: "linear dynamics state",
                expected: self.state_dim(),
                got: state.len(),
            });
        }
        if input.len() != self.input_dim() {
            return Err(ModelError::DimensionMismatch {
                context: "linear dynamics input",
                expected: self.input_dim(),
                got: input.len(),
            });
        }
        Ok(())
    }
}

impl SystemDynamics for LinearSystemDynamics {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn input_dim(&self) -> usize {
        self.b.ncols()
    }

    fn flow_map(&self, _time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError> {
        self.check(state, input)?;
        Ok(&self.a * state + &self.b * input + &self.bias)
    }

    fn linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        Ok(VectorFunctionLinearApproximation {
            f: self.flow_map(time, state, input)?,
            dfdx: self.a.clone(),
            dfdu: self.b.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn double_integrator() -> LinearSystemDynamics {
        LinearSystemDynamics::new(
            Matrix::from_row_slice(2, 2, &[0.0, 1.0, 0.0, 0.0]),
            Matrix::from_row_slice(2, 1, &[0.0, 1.0]),
        )
    }

    #[test]
    fn test_flow_map() {
        let sys = double_integrator();
        let x = Vector::from_vec(vec![1.0, 2.0]);
        let u = Vector::from_vec(vec![3.0]);
        let dx = sys.flow_map(0.0, &x, &u).unwrap();
        assert_relative_eq!(dx, Vector::from_vec(vec![2.0, 3.0]));
    }

    #[test]
    fn test_default_jump_map_is_identity() {
        let sys = double_integrator();
        let x = Vector::from_vec(vec![1.0, 2.0]);
        let jump = sys.jump_map_linear_approximation(0.0, &x).unwrap();
        assert_eq!(jump.f, x);
        assert_eq!(jump.dfdx, Matrix::identity(2, 2));
    }

    #[test]
    fn test_dimension_mismatch() {
        let sys = double_integrator();
        let result = sys.flow_map(0.0, &Vector::zeros(3), &Vector::zeros(1));
        assert!(matches!(result, Err(ModelError::DimensionMismatch { expected: 2, got: 3, .. })));
    }
}
