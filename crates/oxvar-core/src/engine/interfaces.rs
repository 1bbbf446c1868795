//! Capability traits implemented by the external model, observation and covariance code.
//!
//! The engine never sees concrete physics. Everything it needs from a forecast system is
//! expressed through the traits in this module, and collaborator failures come back as
//! boxed errors that the engine wraps without inspecting.

use crate::core::control::ControlIncrement;
use crate::core::space::VectorSpace;
use crate::engine::error::BoxError;
use crate::engine::observers::{
    AdjointObservers, BoxedAdjointObserver, BoxedTangentLinearObserver, TangentLinearObservers,
};

/// The background (Jb) term of the cost function.
pub trait BackgroundTerm<I: VectorSpace> {
    /// Hook observing the tangent-linear run, for formulations whose background term
    /// depends on the trajectory (model-error forcing, for instance).
    fn initialize_tl(&self) -> Option<BoxedTangentLinearObserver<'_, I, ControlIncrement<I>>> {
        None
    }

    /// Combines the hook output with the input increment into `out`.
    fn finalize_tl(
        &self,
        jq: Option<ControlIncrement<I>>,
        dx: &ControlIncrement<I>,
        out: &mut ControlIncrement<I>,
    ) -> Result<(), BoxError> {
        *out = dx.clone();
        if let Some(jq) = jq {
            *out += &jq;
        }
        Ok(())
    }

    /// Adds `binv_dx` into `dz` and optionally returns a hook for the adjoint run.
    fn initialize_ad(
        &self,
        dz: &mut ControlIncrement<I>,
        binv_dx: &ControlIncrement<I>,
    ) -> Option<BoxedAdjointObserver<'_, I>> {
        *dz += binv_dx;
        None
    }

    fn finalize_ad(
        &self,
        contribution: Option<ControlIncrement<I>>,
        dz: &mut ControlIncrement<I>,
    ) -> Result<(), BoxError> {
        if let Some(contribution) = contribution {
            *dz += &contribution;
        }
        Ok(())
    }

    fn multiply_binv(&self, dx: &ControlIncrement<I>) -> Result<ControlIncrement<I>, BoxError>;

    fn multiply_b(&self, dx: &ControlIncrement<I>) -> Result<ControlIncrement<I>, BoxError>;

    /// Outer-loop departure `xk - xb` in control space.
    fn first_guess(&self) -> ControlIncrement<I>;

    /// A zero increment with the full control structure (auxiliary slots included).
    fn new_increment(&self) -> ControlIncrement<I>;
}

/// One observation or constraint term of the cost function.
pub trait CostTerm<I: VectorSpace, D: VectorSpace> {
    fn name(&self) -> &str;

    /// Hook producing `H dx` for this term during a tangent-linear run.
    fn setup_tl(&self, dx: &ControlIncrement<I>) -> BoxedTangentLinearObserver<'_, I, D>;

    /// Hook adding `Hᵗ forcing` into the accumulator during an adjoint run.
    fn setup_ad(&self, forcing: D) -> BoxedAdjointObserver<'_, I>;

    fn multiply_co_inv(&self, dy: &D) -> Result<D, BoxError>;

    fn multiply_covar(&self, dy: &D) -> Result<D, BoxError>;

    fn new_dual_vector(&self) -> D;

    /// `R⁻¹(H(xk) - y)` at the current outer-loop trajectory.
    fn new_gradient_fg(&self) -> D;
}

/// Runs linearized integrations over the assimilation window.
///
/// Implementations must call the observer sets' `initialize`, then `process` once per
/// step, then `finalize`. Adjoint runs visit the steps in reverse order.
pub trait ModelRunner<I: VectorSpace, D> {
    fn run_tlm(
        &self,
        dx: &mut ControlIncrement<I>,
        observers: &mut TangentLinearObservers<'_, I, D>,
    ) -> Result<(), BoxError>;

    fn run_adj(
        &self,
        dx: &mut ControlIncrement<I>,
        observers: &mut AdjointObservers<'_, I>,
    ) -> Result<(), BoxError>;
}

/// A linear change of variables and its adjoint, such as a balance operator.
pub trait LinearVariableChange<I> {
    fn name(&self) -> &str {
        "LinearVariableChange"
    }

    fn multiply(&self, dx: &I) -> Result<I, BoxError>;

    fn multiply_ad(&self, dx: &I) -> Result<I, BoxError>;

    fn multiply_inverse(&self, dx: &I) -> Result<I, BoxError>;

    fn multiply_inverse_ad(&self, dx: &I) -> Result<I, BoxError>;
}
