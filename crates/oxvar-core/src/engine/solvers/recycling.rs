use crate::core::space::VectorSpace;
use nalgebra::{DMatrix, DVector};
use std::collections::VecDeque;
use tracing::debug;

/// Memory of preconditioned search directions `s` and their images `A s` kept between
/// successive solves with the same operator.
///
/// Retention is first-in-first-out: once `capacity` pairs are held, recording a new pair
/// drops the oldest one. A capacity of zero disables recording.
#[derive(Debug, Clone)]
pub struct SearchDirections<V> {
    capacity: usize,
    pairs: VecDeque<(V, V)>,
}

impl<V: VectorSpace> SearchDirections<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pairs: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn record(&mut self, direction: &V, image: &V) {
        if self.capacity == 0 {
            return;
        }
        if self.pairs.len() == self.capacity {
            self.pairs.pop_front();
        }
        self.pairs.push_back((direction.clone(), image.clone()));
    }

    /// Projects `b` onto the span of the stored images.
    ///
    /// Solves the small normal-equation system `G c = d` with `G_ij = <A s_i, A s_j>` and
    /// `d_i = <A s_i, b>`, then returns `x0 = Σ c_i s_i`. Returns `None` when the memory is
    /// empty or the Gram matrix is numerically singular.
    pub fn warm_start(&self, b: &V) -> Option<V> {
        let k = self.pairs.len();
        if k == 0 {
            return None;
        }
        let gram = DMatrix::from_fn(k, k, |i, j| self.pairs[i].1.dot(&self.pairs[j].1));
        let rhs = DVector::from_fn(k, |i, _| self.pairs[i].1.dot(b));
        let coefficients = gram.cholesky()?.solve(&rhs);
        if coefficients.iter().any(|c| !c.is_finite()) {
            return None;
        }

        let mut x0 = b.zeroed();
        let mut r0 = b.clone();
        for ((direction, image), c) in self.pairs.iter().zip(coefficients.iter()) {
            x0.axpy(*c, direction);
            r0.axpy(-*c, image);
        }
        debug!(
            "Warm start from {} stored direction(s): projected residual norm {:.6e} -> {:.6e}",
            k,
            b.norm(),
            r0.norm()
        );
        Some(x0)
    }
}
