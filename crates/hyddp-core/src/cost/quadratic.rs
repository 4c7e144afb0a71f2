//! Quadratic tracking cost
//!
//! ```text
//! L = ½ δxᵀQ δx + ½ δuᵀR δu + δuᵀP δx,   δx = x - x_ref(t), δu = u - u_ref(t)
//! Φ = ½ δxᵀQf δx
//! ```
//!
//! Without installed targets the deviations are taken around zero.

use crate::approximation::ScalarFunctionQuadraticApproximation;
use crate::cost::{CostFunction, TargetTrajectories};
use crate::{Matrix, ModelError, Vector};

/// Quadratic cost around the target trajectories
#[derive(Debug, Clone, PartialEq)]
pub struct QuadraticCost {
    pub q: Matrix,
    pub r: Matrix,
    /// Input/state cross weight, `nu × nx`
    pub p: Matrix,
    pub q_final: Matrix,
}

impl QuadraticCost {
    /// Cost without cross term
    pub fn new(q: Matrix, r: Matrix, q_final: Matrix) -> Self {
        let p = Matrix::zeros(r.nrows(), q.nrows());
        Self { q, r, p, q_final }
    }

    pub fn with_cross_term(mut self, p: Matrix) -> Self {
        assert_eq!(p.shape(), (self.r.nrows(), self.q.nrows()), "cross term must be nu × nx");
        self.p = p;
        self
    }

    fn state_deviation(&self, time: f64, state: &Vector, targets: &TargetTrajectories) -> Result<Vector, ModelError> {
        if state.len() != self.q.nrows() {
            return Err(ModelError::DimensionMismatch {
                context: "quadratic cost state",
                expected: self.q.nrows(),
                got: state.len(),
            });
        }
        Ok(match targets.desired_state(time) {
            Some(x_ref) => state - x_ref,
            None => state.clone(),
        })
    }

    fn input_deviation(&self, time: f64, input: &Vector, targets: &TargetTrajectories) -> Result<Vector, ModelError> {
        if input.len() != self.r.nrows() {
            return Err(ModelError::DimensionMismatch {
                context: "quadratic cost input",
                expected: self.r.nrows(),
                got: input.len(),
            });
        }
        Ok(match targets.desired_input(time) {
            Some(u_ref) => input - u_ref,
            None => input.clone(),
        })
    }
}

impl CostFunction for QuadraticCost {
    fn cost(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<f64, ModelError> {
        let dx = self.state_deviation(time, state, targets)?;
        let du = self.input_deviation(time, input, targets)?;
        Ok(0.5 * dx.dot(&(&self.q * &dx)) + 0.5 * du.dot(&(&self.r * &du)) + du.dot(&(&self.p * &dx)))
    }

    fn quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        input: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let dx = self.state_deviation(time, state, targets)?;
        let du = self.input_deviation(time, input, targets)?;
        let q_dx = &self.q * &dx;
        let r_du = &self.r * &du;
        let p_dx = &self.p * &dx;
        Ok(ScalarFunctionQuadraticApproximation {
            f: 0.5 * dx.dot(&q_dx) + 0.5 * du.dot(&r_du) + du.dot(&p_dx),
            dfdx: q_dx + self.p.transpose() * &du,
            dfdu: r_du + p_dx,
            dfdxx: self.q.clone(),
            dfduu: self.r.clone(),
            dfdux: self.p.clone(),
        })
    }

    fn final_cost(&self, time: f64, state: &Vector, targets: &TargetTrajectories) -> Result<f64, ModelError> {
        let dx = self.state_deviation(time, state, targets)?;
        Ok(0.5 * dx.dot(&(&self.q_final * &dx)))
    }

    fn final_cost_quadratic_approximation(
        &self,
        time: f64,
        state: &Vector,
        targets: &TargetTrajectories,
    ) -> Result<ScalarFunctionQuadraticApproximation, ModelError> {
        let dx = self.state_deviation(time, state, targets)?;
        let qf_dx = &self.q_final * &dx;
        let nx = state.len();
        Ok(ScalarFunctionQuadraticApproximation {
            f: 0.5 * dx.dot(&qf_dx),
            dfdx: qf_dx,
            dfdu: Vector::zeros(0),
            dfdxx: self.q_final.clone(),
            dfduu: Matrix::zeros(0, 0),
            dfdux: Matrix::zeros(0, nx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cost() -> QuadraticCost {
        QuadraticCost::new(Matrix::identity(2, 2), Matrix::identity(1, 1) * 2.0, Matrix::identity(2, 2) * 4.0)
            .with_cross_term(Matrix::from_row_slice(1, 2, &[0.5, 0.0]))
    }

    #[test]
    fn test_cost_value_around_target() {
        let targets = TargetTrajectories::constant(Vector::from_vec(vec![1.0, 0.0]), Vector::zeros(1));
        let x = Vector::from_vec(vec![2.0, 1.0]);
        let u = Vector::from_vec(vec![1.0]);
        // ½·2 + ½·2 + 1·0.5
        let l = cost().cost(0.0, &x, &u, &targets).unwrap();
        assert_relative_eq!(l, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_quadratic_approximation_is_exact() {
        let targets = TargetTrajectories::default();
        let c = cost();
        let x = Vector::from_vec(vec![0.3, -0.2]);
        let u = Vector::from_vec(vec![0.7]);
        let approx = c.quadratic_approximation(0.0, &x, &u, &targets).unwrap();

        let dx = Vector::from_vec(vec![0.1, 0.4]);
        let du = Vector::from_vec(vec![-0.3]);
        let exact = c.cost(0.0, &(&x + &dx), &(&u + &du), &targets).unwrap();
        assert_relative_eq!(approx.evaluate(&dx, &du), exact, epsilon = 1e-12);
    }

    #[test]
    fn test_final_cost_gradient() {
        let targets = TargetTrajectories::default();
        let x = Vector::from_vec(vec![1.0, -1.0]);
        let approx = cost().final_cost_quadratic_approximation(1.0, &x, &targets).unwrap();
        assert_relative_eq!(approx.f, 4.0, epsilon = 1e-12);
        assert_relative_eq!(approx.dfdx, Vector::from_vec(vec![4.0, -4.0]), epsilon = 1e-12);
        assert_eq!(approx.nu(), 0);
    }
}
