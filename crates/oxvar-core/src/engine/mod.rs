//! # Engine Module
//!
//! The stateful minimization machinery: cost function, curvature operators, Krylov solvers,
//! adjoint diagnostics and ensemble linearization.
//!
//! ## Overview
//!
//! Each application of a curvature operator drives one tangent-linear and one adjoint
//! integration through the [`cost::CostFunction`]. Cost terms and the background term
//! take part in those integrations by enrolling hooks in the observer sets of
//! [`observers`]. The Krylov solvers in [`solvers`] only ever see the
//! [`operators::LinearOperator`] trait and the vector-space inner product.
//!
//! ## Architecture
//!
//! - **Collaborator Interfaces** ([`interfaces`]) - Traits implemented by the external model,
//!   observation operators and covariances
//! - **Observers** ([`observers`]) - Hook sets broadcast by the model runner
//! - **Cost Function** ([`cost`]) - Background term, ordered cost terms and model runner
//! - **Operators** ([`operators`]) - Hessian, saddle-point matrix and preconditioners
//! - **Solvers** ([`solvers`]) - FGMRES, GMRESR and search-direction recycling
//! - **Diagnostics** ([`diagnostics`]) - Adjoint, covariance and variable-change self-tests
//! - **Ensembles** ([`ensemble`]) - Perturbation sets for flow-dependent covariances
//! - **Configuration** ([`config`]) - Validated settings and their builders
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod config;
pub mod cost;
pub mod diagnostics;
pub mod ensemble;
pub mod error;
pub mod interfaces;
pub mod observers;
pub mod operators;
pub mod progress;
pub mod solvers;
