//! # oxvar Core Library
//!
//! A model-agnostic minimization engine for incremental variational and ensemble data
//! assimilation. The engine combines a background estimate with observations by solving the
//! linearized cost-function system, driving tangent-linear and adjoint integrations supplied
//! by an external forecast model and observation operators.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the numerical kernels never
//! depend on any concrete model or observation physics.
//!
//! - **[`core`]: The Foundation.** Stateless vector-space types: the `VectorSpace` trait,
//!   `ControlIncrement`, `DualVector` and `SaddlePointVector`.
//!
//! - **[`engine`]: The Logic Core.** The cost function and its integration observers, the
//!   matrix-free curvature operators (Hessian, saddle point and its preconditioner), the
//!   Krylov solvers that invert them, the adjoint self-test harness and ensemble
//!   linearization.
//!
//! - **[`workflows`]: The Public API.** Minimizers that assemble right-hand sides, pick an
//!   operator and a solver, and return the analysis increment.
//!
//! A small diagnostic backend lives in [`toy`] (feature `toy`). It provides diagonal
//! covariances, a linear advection tangent-linear model with its exact adjoint and point
//! observations, which is enough to exercise every operator end to end.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(any(test, feature = "toy"))]
pub mod toy;
