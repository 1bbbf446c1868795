//! Krylov-subspace solvers for the matrix-free curvature operators.
//!
//! Both solvers work on any [`VectorSpace`] and measure residuals with its inner product.
//! Non-convergence is not an error: the caller inspects [`KrylovOutcome::reduction`].

pub mod fgmres;
pub mod gmresr;
pub mod recycling;

use crate::core::space::VectorSpace;
use crate::engine::error::EngineError;
use crate::engine::operators::LinearOperator;

pub use fgmres::{FgmresOptions, fgmres};
pub use gmresr::gmresr;
pub use recycling::SearchDirections;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KrylovOutcome {
    /// Final residual norm divided by the initial residual norm.
    pub reduction: f64,
    pub iterations: usize,
}

impl KrylovOutcome {
    pub(crate) fn converged_immediately() -> Self {
        Self {
            reduction: 0.0,
            iterations: 0,
        }
    }
}

/// `b - A x`.
pub(crate) fn residual<V, A>(x: &V, b: &V, operator: &mut A) -> Result<V, EngineError>
where
    V: VectorSpace,
    A: LinearOperator<V>,
{
    let ax = operator.multiply(x)?;
    let mut r = b.clone();
    r.axpy(-1.0, &ax);
    Ok(r)
}

/// `b - A x`, skipping the operator application for a zero initial guess.
pub(crate) fn initial_residual<V, A>(x: &V, b: &V, operator: &mut A) -> Result<V, EngineError>
where
    V: VectorSpace,
    A: LinearOperator<V>,
{
    if x.norm() == 0.0 {
        Ok(b.clone())
    } else {
        residual(x, b, operator)
    }
}
