//! # Toy Backend
//!
//! A small, physics-free backend that implements every collaborator trait of the engine.
//!
//! - [`background`] - Diagonal background-error covariance, bias variances included
//! - [`model`] - Periodic upwind advection `x_i ← a x_i + (1 - a) x_{i-1}` and its exact
//!   adjoint
//! - [`observations`] - Point observations with optional scalar bias control
//! - [`ensemble`] - States on a periodic 1-D grid, in-memory member source and a
//!   bidiagonal balance operator
//! - [`problem`] - TOML problem descriptions assembled into a `CostFunction`
//!
//! Nothing here is meant as a dynamical model; it exists so the operators, solvers and
//! diagnostics can be exercised end to end.

pub mod background;
pub mod ensemble;
pub mod model;
pub mod observations;
pub mod problem;

use crate::engine::config::ConfigError;
use thiserror::Error;

pub use background::ToyBackground;
pub use ensemble::{
    InMemoryMembers, ToyBalance, ToyEnsemble, ToyEnsembleSpec, ToyGeometry, ToyState,
};
pub use model::ToyModel;
pub use observations::{ObsPoint, PointObservations};
pub use problem::{ToyProblem, ToyProblemSpec};

#[derive(Debug, Error)]
pub enum ToyError {
    #[error("Invalid toy description: {0}")]
    InvalidSpec(String),

    #[error("Failed to parse toy description: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Dimension mismatch: expected {expected}, found {found}")]
    Dimension { expected: usize, found: usize },

    #[error("Control increment has no auxiliary slot {0}")]
    MissingBiasSlot(usize),

    #[error("Observation '{term}' references grid index {index} but the grid has {size} points")]
    PointOutOfRange {
        term: String,
        index: usize,
        size: usize,
    },

    #[error("Unknown ensemble member '{0}'")]
    UnknownMember(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub(crate) fn check_len(expected: usize, found: usize) -> Result<(), ToyError> {
    if expected != found {
        return Err(ToyError::Dimension { expected, found });
    }
    Ok(())
}
