use super::control::ControlIncrement;
use super::space::VectorSpace;
use std::ops::{AddAssign, Index, IndexMut, MulAssign, SubAssign};

/// An ordered collection of per-term dual-space vectors.
///
/// Entries are positionally aligned with the cost function's term order: the optional
/// background-linked slot first (`dx`), then one entry per term in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct DualVector<I, D> {
    dx: Option<ControlIncrement<I>>,
    terms: Vec<D>,
}

impl<I, D> Default for DualVector<I, D> {
    fn default() -> Self {
        Self {
            dx: None,
            terms: Vec::new(),
        }
    }
}

impl<I: VectorSpace, D: VectorSpace> DualVector<I, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dx(dx: ControlIncrement<I>) -> Self {
        Self {
            dx: Some(dx),
            terms: Vec::new(),
        }
    }

    pub fn dx(&self) -> Option<&ControlIncrement<I>> {
        self.dx.as_ref()
    }

    pub fn dx_mut(&mut self) -> Option<&mut ControlIncrement<I>> {
        self.dx.as_mut()
    }

    pub fn set_dx(&mut self, dx: ControlIncrement<I>) {
        self.dx = Some(dx);
    }

    /// Appends a term entry and returns its position.
    pub fn append(&mut self, value: D) -> usize {
        self.terms.push(value);
        self.terms.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&D> {
        self.terms.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut D> {
        self.terms.get_mut(index)
    }

    /// Number of term entries, not counting the background slot.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.terms.iter()
    }

    fn check_structure(&self, other: &Self) {
        assert_eq!(
            self.terms.len(),
            other.terms.len(),
            "dual vectors have different term counts"
        );
        assert_eq!(
            self.dx.is_some(),
            other.dx.is_some(),
            "dual vectors disagree on the background slot"
        );
    }
}

impl<I: VectorSpace, D: VectorSpace> VectorSpace for DualVector<I, D> {
    fn zero(&mut self) {
        if let Some(dx) = &mut self.dx {
            dx.zero();
        }
        self.terms.iter_mut().for_each(VectorSpace::zero);
    }

    fn random(&mut self) {
        if let Some(dx) = &mut self.dx {
            dx.random();
        }
        self.terms.iter_mut().for_each(VectorSpace::random);
    }

    fn scale(&mut self, factor: f64) {
        if let Some(dx) = &mut self.dx {
            dx.scale(factor);
        }
        for term in &mut self.terms {
            term.scale(factor);
        }
    }

    fn axpy(&mut self, alpha: f64, other: &Self) {
        self.check_structure(other);
        if let (Some(dx), Some(x)) = (&mut self.dx, &other.dx) {
            dx.axpy(alpha, x);
        }
        for (term, x) in self.terms.iter_mut().zip(other.terms.iter()) {
            term.axpy(alpha, x);
        }
    }

    fn dot(&self, other: &Self) -> f64 {
        self.check_structure(other);
        let background = match (&self.dx, &other.dx) {
            (Some(a), Some(b)) => a.dot(b),
            _ => 0.0,
        };
        background
            + self
                .terms
                .iter()
                .zip(other.terms.iter())
                .map(|(a, b)| a.dot(b))
                .sum::<f64>()
    }
}

impl<I, D> Index<usize> for DualVector<I, D> {
    type Output = D;

    fn index(&self, index: usize) -> &D {
        &self.terms[index]
    }
}

impl<I, D> IndexMut<usize> for DualVector<I, D> {
    fn index_mut(&mut self, index: usize) -> &mut D {
        &mut self.terms[index]
    }
}

impl<I: VectorSpace, D: VectorSpace> AddAssign<&DualVector<I, D>> for DualVector<I, D> {
    fn add_assign(&mut self, rhs: &DualVector<I, D>) {
        self.axpy(1.0, rhs);
    }
}

impl<I: VectorSpace, D: VectorSpace> SubAssign<&DualVector<I, D>> for DualVector<I, D> {
    fn sub_assign(&mut self, rhs: &DualVector<I, D>) {
        self.axpy(-1.0, rhs);
    }
}

impl<I: VectorSpace, D: VectorSpace> MulAssign<f64> for DualVector<I, D> {
    fn mul_assign(&mut self, rhs: f64) {
        self.scale(rhs);
    }
}
