use super::space::VectorSpace;
use nalgebra::DVector;
use std::ops::{AddAssign, MulAssign, SubAssign};

/// A full control-space perturbation.
///
/// Holds the model-space increment together with one auxiliary increment per cost term
/// that carries extra control variables (observation bias coefficients, for example).
/// Auxiliary slots are addressed by the index the owning term was given when the cost
/// function was assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlIncrement<I> {
    state: I,
    aux: Vec<DVector<f64>>,
}

impl<I: VectorSpace> ControlIncrement<I> {
    pub fn new(state: I) -> Self {
        Self {
            state,
            aux: Vec::new(),
        }
    }

    pub fn with_aux(state: I, aux: Vec<DVector<f64>>) -> Self {
        Self { state, aux }
    }

    #[inline]
    pub fn state(&self) -> &I {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut I {
        &mut self.state
    }

    pub fn aux(&self, slot: usize) -> Option<&DVector<f64>> {
        self.aux.get(slot)
    }

    pub fn aux_mut(&mut self, slot: usize) -> Option<&mut DVector<f64>> {
        self.aux.get_mut(slot)
    }

    pub fn n_aux(&self) -> usize {
        self.aux.len()
    }

    pub fn into_state(self) -> I {
        self.state
    }

    /// Auxiliary slots must agree in count and length for two increments to be combined.
    pub fn same_structure(&self, other: &Self) -> bool {
        self.aux.len() == other.aux.len()
            && self
                .aux
                .iter()
                .zip(other.aux.iter())
                .all(|(a, b)| a.len() == b.len())
    }
}

impl<I: VectorSpace> VectorSpace for ControlIncrement<I> {
    fn zero(&mut self) {
        self.state.zero();
        for aux in &mut self.aux {
            VectorSpace::zero(aux);
        }
    }

    fn random(&mut self) {
        self.state.random();
        for aux in &mut self.aux {
            VectorSpace::random(aux);
        }
    }

    fn scale(&mut self, factor: f64) {
        self.state.scale(factor);
        for aux in &mut self.aux {
            VectorSpace::scale(aux, factor);
        }
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        assert!(
            self.same_structure(other),
            "control increments have different auxiliary structure"
        );
        self.state.axpy(alpha, &other.state);
        for (aux, x) in self.aux.iter_mut().zip(other.aux.iter()) {
            VectorSpace::axpy(aux, alpha, x);
        }
    }

    fn dot(&self, other: &Self) -> f64 {
        assert!(
            self.same_structure(other),
            "control increments have different auxiliary structure"
        );
        let aux: f64 = self
            .aux
            .iter()
            .zip(other.aux.iter())
            .map(|(a, b)| VectorSpace::dot(a, b))
            .sum();
        self.state.dot(&other.state) + aux
    }
}

impl<I: VectorSpace> AddAssign<&ControlIncrement<I>> for ControlIncrement<I> {
    fn add_assign(&mut self, rhs: &ControlIncrement<I>) {
        self.axpy(1.0, rhs);
    }
}

impl<I: VectorSpace> SubAssign<&ControlIncrement<I>> for ControlIncrement<I> {
    fn sub_assign(&mut self, rhs: &ControlIncrement<I>) {
        self.axpy(-1.0, rhs);
    }
}

impl<I: VectorSpace> MulAssign<f64> for ControlIncrement<I> {
    fn mul_assign(&mut self, rhs: f64) {
        self.scale(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn increment(state: &[f64], aux: &[&[f64]]) -> ControlIncrement<DVector<f64>> {
        ControlIncrement::with_aux(
            DVector::from_column_slice(state),
            aux.iter().map(|a| DVector::from_column_slice(a)).collect(),
        )
    }

    #[test]
    fn dot_includes_auxiliary_slots() {
        let a = increment(&[1.0, 2.0], &[&[3.0]]);
        let b = increment(&[4.0, 5.0], &[&[6.0]]);
        assert_eq!(a.dot(&b), 1.0 * 4.0 + 2.0 * 5.0 + 3.0 * 6.0);
    }

    #[test]
    fn zero_then_random_round_trip() {
        let mut v = increment(&[1.0, 2.0, 3.0], &[&[1.0, 1.0]]);
        v.zero();
        assert_eq!(v.dot(&v), 0.0);
        v.random();
        assert!(v.dot(&v) > 0.0);
    }

    #[test]
    fn operators_delegate_to_axpy_and_scale() {
        let mut a = increment(&[1.0, 1.0], &[&[2.0]]);
        let b = increment(&[1.0, -1.0], &[&[1.0]]);
        a += &b;
        assert_eq!(a, increment(&[2.0, 0.0], &[&[3.0]]));
        a -= &b;
        assert_eq!(a, increment(&[1.0, 1.0], &[&[2.0]]));
        a *= 3.0;
        assert_eq!(a, increment(&[3.0, 3.0], &[&[6.0]]));
    }

    #[test]
    fn same_structure_checks_aux_lengths() {
        let a = increment(&[1.0], &[&[1.0, 2.0]]);
        let b = increment(&[1.0], &[&[1.0]]);
        let c = increment(&[1.0], &[]);
        assert!(!a.same_structure(&b));
        assert!(!a.same_structure(&c));
        assert!(a.same_structure(&a.zeroed()));
    }

    #[test]
    #[should_panic(expected = "different auxiliary structure")]
    fn axpy_panics_on_structure_mismatch() {
        let mut a = increment(&[1.0], &[&[1.0]]);
        let b = increment(&[1.0], &[]);
        a.axpy(1.0, &b);
    }
}
