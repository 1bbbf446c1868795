use super::control::ControlIncrement;
use super::dual::DualVector;
use super::space::VectorSpace;
use std::ops::{AddAssign, MulAssign, SubAssign};

/// Unknown of the saddle-point system: the primal increment and its Lagrange multipliers.
#[derive(Debug, Clone, PartialEq)]
pub struct SaddlePointVector<I, D> {
    dx: ControlIncrement<I>,
    lambda: DualVector<I, D>,
}

impl<I: VectorSpace, D: VectorSpace> SaddlePointVector<I, D> {
    pub fn new(dx: ControlIncrement<I>, lambda: DualVector<I, D>) -> Self {
        Self { dx, lambda }
    }

    pub fn dx(&self) -> &ControlIncrement<I> {
        &self.dx
    }

    pub fn dx_mut(&mut self) -> &mut ControlIncrement<I> {
        &mut self.dx
    }

    pub fn lambda(&self) -> &DualVector<I, D> {
        &self.lambda
    }

    pub fn lambda_mut(&mut self) -> &mut DualVector<I, D> {
        &mut self.lambda
    }

    pub fn into_parts(self) -> (ControlIncrement<I>, DualVector<I, D>) {
        (self.dx, self.lambda)
    }
}

impl<I: VectorSpace, D: VectorSpace> VectorSpace for SaddlePointVector<I, D> {
    fn zero(&mut self) {
        self.dx.zero();
        self.lambda.zero();
    }

    fn random(&mut self) {
        self.dx.random();
        self.lambda.random();
    }

    fn scale(&mut self, factor: f64) {
        self.dx.scale(factor);
        self.lambda.scale(factor);
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        self.dx.axpy(alpha, &other.dx);
        self.lambda.axpy(alpha, &other.lambda);
    }

    fn dot(&self, other: &Self) -> f64 {
        self.dx.dot(&other.dx) + self.lambda.dot(&other.lambda)
    }
}

impl<I: VectorSpace, D: VectorSpace> AddAssign<&SaddlePointVector<I, D>>
    for SaddlePointVector<I, D>
{
    fn add_assign(&mut self, rhs: &SaddlePointVector<I, D>) {
        self.axpy(1.0, rhs);
    }
}

impl<I: VectorSpace, D: VectorSpace> SubAssign<&SaddlePointVector<I, D>>
    for SaddlePointVector<I, D>
{
    fn sub_assign(&mut self, rhs: &SaddlePointVector<I, D>) {
        self.axpy(-1.0, rhs);
    }
}

impl<I: VectorSpace, D: VectorSpace> MulAssign<f64> for SaddlePointVector<I, D> {
    fn mul_assign(&mut self, rhs: f64) {
        self.scale(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    fn vector(
        dx: &[f64],
        lambda_dx: &[f64],
        terms: &[&[f64]],
    ) -> SaddlePointVector<DVector<f64>, DVector<f64>> {
        let mut lambda = DualVector::with_dx(ControlIncrement::new(DVector::from_column_slice(
            lambda_dx,
        )));
        for t in terms {
            lambda.append(DVector::from_column_slice(t));
        }
        SaddlePointVector::new(ControlIncrement::new(DVector::from_column_slice(dx)), lambda)
    }

    #[test]
    fn dot_adds_primal_and_dual_parts() {
        let a = vector(&[1.0, 2.0], &[1.0, 0.0], &[&[2.0]]);
        let b = vector(&[3.0, 4.0], &[5.0, 6.0], &[&[7.0]]);
        assert_eq!(a.dot(&b), 3.0 + 8.0 + 5.0 + 14.0);
    }

    #[test]
    fn negation_flips_every_component() {
        let mut v = vector(&[1.0], &[2.0], &[&[3.0, -4.0]]);
        v *= -1.0;
        assert_eq!(v, vector(&[-1.0], &[-2.0], &[&[-3.0, 4.0]]));
    }

    #[test]
    fn zero_random_round_trip() {
        let mut v = vector(&[1.0, 1.0], &[1.0, 1.0], &[&[1.0]]);
        v.zero();
        assert_eq!(v.dot(&v), 0.0);
        v.random();
        assert!(v.dot(&v) > 0.0);
    }

    #[test]
    fn add_then_subtract_restores_value() {
        let original = vector(&[1.0, 2.0], &[0.5, 0.5], &[&[1.0]]);
        let delta = vector(&[0.25, -1.0], &[1.0, 2.0], &[&[3.0]]);
        let mut v = original.clone();
        v += &delta;
        v -= &delta;
        assert_eq!(v, original);
    }
}
