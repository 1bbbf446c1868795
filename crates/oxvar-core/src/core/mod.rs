//! # Core Module
//!
//! Stateless algebraic building blocks for the minimization engine.
//!
//! ## Overview
//!
//! Everything the solvers and operators manipulate is a vector in some inner-product
//! space. This module defines that contract and the three composite vectors built on it:
//!
//! - [`space`] - The [`space::VectorSpace`] trait and its implementation for
//!   `nalgebra::DVector<f64>`
//! - [`control`] - [`control::ControlIncrement`], a model-space increment plus
//!   per-term auxiliary control increments
//! - [`dual`] - [`dual::DualVector`], per-term dual-space vectors aligned with the cost
//!   function's term order
//! - [`saddle`] - [`saddle::SaddlePointVector`], the primal/dual pair solved for by the
//!   saddle-point formulation
//!
//! Concrete model and observation storage are supplied by the backend through the
//! `VectorSpace` trait; nothing in this module knows about grids or observation types.

pub mod control;
pub mod dual;
pub mod saddle;
pub mod space;
