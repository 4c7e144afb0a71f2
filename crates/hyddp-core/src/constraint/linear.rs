//! Linear constraints

use crate::approximation::{VectorFunctionLinearApproximation, VectorFunctionQuadraticApproximation};
use crate::constraint::{StateConstraint, StateInputConstraint};
use crate::{Matrix, ModelError, Vector};

/// `h = C x + D u + e`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearStateInputConstraint {
    pub c: Matrix,
    pub d: Matrix,
    pub e: Vector,
}

impl LinearStateInputConstraint {
    /// # Panics
    /// If the row counts of `C`, `D` and `e` differ.
    pub fn new(c: Matrix, d: Matrix, e: Vector) -> Self {
        assert_eq!(c.nrows(), d.nrows(), "C and D row counts differ");
        assert_eq!(c.nrows(), e.len(), "C and e row counts differ");
        Self { c, d, e }
    }
}

impl StateInputConstraint for LinearStateInputConstraint {
    fn num_constraints(&self, _time: f64) -> usize {
        self.e.len()
    }

    fn value(&self, _time: f64, state: &Vector, input: &Vector) -> Result<Vector, ModelError> {
        if state.len() != self.c.ncols() {
            return Err(ModelError::DimensionMismatch {
                context: "linear constraint state",
                expected: self.c.ncols(),
                got: state.len(),
            });
        }
        if input.len() != self.d.ncols() {
            return Err(ModelError::DimensionMismatch {
                context: "linear constraint input",
                expected: self.d.ncols(),
                got: input.len(),
            });
        }
        Ok(&self.c * state + &self.d * input + &self.e)
    }

    fn linear_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionLinearApproximation, ModelError> {
        Ok(VectorFunctionLinearApproximation {
            f: self.value(time, state, input)?,
            dfdx: self.c.clone(),
            dfdu: self.d.clone(),
        })
    }

    fn quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
    ) -> Result<VectorFunctionQuadraticApproximation, ModelError> {
        let n = self.e.len();
        let nx = self.c.ncols();
        let nu = self.d.ncols();
        let mut quadratic = VectorFunctionQuadraticApproximation::zero(n, nx, nu);
        quadratic.f = self.value(time, state, input)?;
        quadratic.dfdx = self.c.clone();
        quadratic.dfdu = self.d.clone();
        Ok(quadratic)
    }
}

/// `h = F x + g`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearStateConstraint {
    pub f: Matrix,
    pub g: Vector,
}

impl LinearStateConstraint {
    pub fn new(f: Matrix, g: Vector) -> Self {
        assert_eq!(f.nrows(), g.len(), "F and g row counts differ");
        Self { f, g }
    }
}

impl StateConstraint for LinearStateConstraint {
    fn num_constraints(&self, _time: f64) -> usize {
        self.g.len()
    }

    fn value(&self, _time: f64, state: &Vector) -> Result<Vector, ModelError> {
        if state.len() != self.f.ncols() {
            return Err(ModelError::DimensionMismatch {
                context: "linear state constraint",
                expected: self.f.ncols(),
                got: state.len(),
            });
        }
        Ok(&self.f * state + &self.g)
    }

    fn linear_approximation(&self, time: f64, state: &Vector) -> Result<VectorFunctionLinearApproximation, ModelError> {
        Ok(VectorFunctionLinearApproximation {
            f: self.value(time, state)?,
            dfdx: self.f.clone(),
            dfdu: Matrix::zeros(self.g.len(), 0),
        })
    }
}
