use oxvar::engine::config::{DiagnosticsConfig, MinimizerConfig};
use oxvar::toy::{ToyBalance, ToyProblem};

pub struct SolveConfig {
    pub problem: ToyProblem,
    pub minimizer: MinimizerConfig,
}

pub struct CheckConfig {
    pub problem: ToyProblem,
    pub diagnostics: DiagnosticsConfig,
    pub balance: ToyBalance,
}
