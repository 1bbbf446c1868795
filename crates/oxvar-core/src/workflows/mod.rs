//! # Workflows Module
//!
//! High-level entry points that turn an assembled cost function into an analysis
//! increment.
//!
//! ## Overview
//!
//! A minimizer builds the right-hand side from the first-guess departures, constructs a
//! fresh curvature operator for the solve, runs the matching Krylov solver and returns the
//! control increment together with the achieved residual reduction.
//!
//! - **Minimization** ([`minimize`]) - Saddle-point (GMRESR) and primal (FGMRES)
//!   minimizers, plus the [`minimize::run`] dispatcher driven by `MinimizerConfig`.

pub mod minimize;
