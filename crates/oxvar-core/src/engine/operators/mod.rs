//! Matrix-free linear operators inverted by the Krylov solvers.
//!
//! - [`hessian::HessianMatrix`] - `B⁻¹ + HᵗR⁻¹H` in control space
//! - [`saddle_point::SaddlePointMatrix`] - the saddle-point system `[[D, L], [Lᵗ, 0]]`
//! - [`saddle_point::SaddlePointPrecondMatrix`] - the inexact-constraint preconditioner
//! - [`IdentityMatrix`] and [`BMatrix`] - trivial preconditioners for the primal system

pub mod hessian;
pub mod saddle_point;

use crate::core::control::ControlIncrement;
use crate::core::space::VectorSpace;
use crate::engine::cost::BACKGROUND_TERM;
use crate::engine::error::EngineError;
use crate::engine::interfaces::BackgroundTerm;

pub use hessian::HessianMatrix;
pub use saddle_point::{SaddlePointMatrix, SaddlePointPrecondMatrix};

/// A linear map applied by the solvers.
///
/// Operators take `&mut self` so they can keep a call counter and build fresh observer
/// sets per application.
pub trait LinearOperator<V> {
    fn multiply(&mut self, x: &V) -> Result<V, EngineError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMatrix;

impl<V: VectorSpace> LinearOperator<V> for IdentityMatrix {
    fn multiply(&mut self, x: &V) -> Result<V, EngineError> {
        Ok(x.clone())
    }
}

/// Background-error covariance `B`, used as the primal preconditioner.
pub struct BMatrix<'c, I: VectorSpace> {
    background: &'c dyn BackgroundTerm<I>,
}

impl<'c, I: VectorSpace> BMatrix<'c, I> {
    pub fn new(background: &'c dyn BackgroundTerm<I>) -> Self {
        Self { background }
    }
}

impl<I: VectorSpace> LinearOperator<ControlIncrement<I>> for BMatrix<'_, I> {
    fn multiply(&mut self, x: &ControlIncrement<I>) -> Result<ControlIncrement<I>, EngineError> {
        self.background
            .multiply_b(x)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))
    }
}
