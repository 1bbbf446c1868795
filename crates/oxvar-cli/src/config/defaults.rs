use crate::cli::{Algorithm, PreconditionerArg};

/// Values used when neither the config file nor the command line sets a parameter.
pub struct DefaultsConfig {
    pub algorithm: Algorithm,
    pub max_iterations: usize,
    pub reduction: f64,
    pub preconditioner: PreconditionerArg,
    pub recycled_directions: usize,
    pub adjoint_tolerance: f64,
    pub inverse_tolerance: f64,
    pub balance_coupling: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::SaddlePoint,
            max_iterations: 50,
            reduction: 1e-6,
            preconditioner: PreconditionerArg::Identity,
            recycled_directions: 0,
            adjoint_tolerance: 1e-10,
            inverse_tolerance: 1e-10,
            balance_coupling: 0.5,
        }
    }
}
