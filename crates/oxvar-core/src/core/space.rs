use nalgebra::DVector;
use rand::Rng;

/// The algebraic contract shared by every vector the minimization engine touches.
///
/// Krylov solvers, curvature operators and the adjoint diagnostics only ever see this
/// trait, so `dot` must be symmetric and bilinear for the results to be meaningful.
pub trait VectorSpace: Clone {
    /// Sets every component to zero, keeping the structure.
    fn zero(&mut self);

    /// Fills every component with pseudo-random values in `[-1, 1)`.
    fn random(&mut self);

    /// Scales every component in place.
    fn scale(&mut self, factor: f64);

    /// Computes `self += alpha * other`.
    fn axpy(&mut self, alpha: f64, other: &Self);

    /// Inner product under which the operators are expected to be self-adjoint.
    fn dot(&self, other: &Self) -> f64;

    #[inline]
    fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Returns a copy with the same structure and every component set to zero.
    fn zeroed(&self) -> Self {
        let mut copy = self.clone();
        copy.zero();
        copy
    }
}

impl VectorSpace for DVector<f64> {
    fn zero(&mut self) {
        self.fill(0.0);
    }

    fn random(&mut self) {
        let mut rng = rand::thread_rng();
        for value in self.iter_mut() {
            *value = rng.gen_range(-1.0..1.0);
        }
    }

    fn scale(&mut self, factor: f64) {
        for value in self.iter_mut() {
            *value *= factor;
        }
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        assert_eq!(
            self.len(),
            other.len(),
            "axpy on vectors of different length"
        );
        for (value, x) in self.iter_mut().zip(other.iter()) {
            *value += alpha * x;
        }
    }

    fn dot(&self, other: &Self) -> f64 {
        assert_eq!(
            self.len(),
            other.len(),
            "dot product of vectors of different length"
        );
        self.iter().zip(other.iter()).map(|(a, b)| a * b).sum()
    }
}
