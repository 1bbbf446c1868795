use clap::{Args, Parser, Subcommand, ValueEnum};
use oxvar::engine::config::{MinimizerKind, Preconditioner};
use serde::Deserialize;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu, William A. Goddard III, Victor Wai Tak Kam",
    version,
    about = "oxvar CLI - Drive the oxvar minimization engine on toy assimilation problems.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Minimize the incremental cost function of a problem and write the analysis increment.
    Solve(SolveArgs),
    /// Run the adjoint and covariance consistency checks on a problem.
    Check(CheckArgs),
    /// Linearize an ensemble and write its perturbations.
    Ensemble(EnsembleArgs),
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    SaddlePoint,
    Fgmres,
}

impl From<Algorithm> for MinimizerKind {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::SaddlePoint => MinimizerKind::SaddlePoint,
            Algorithm::Fgmres => MinimizerKind::Fgmres,
        }
    }
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PreconditionerArg {
    Identity,
    Background,
}

impl From<PreconditionerArg> for Preconditioner {
    fn from(p: PreconditionerArg) -> Self {
        match p {
            PreconditionerArg::Identity => Preconditioner::Identity,
            PreconditionerArg::Background => Preconditioner::Background,
        }
    }
}

/// Arguments for the `solve` subcommand.
#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the analysis increment CSV. Printed to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    // --- Minimizer Overrides ---
    /// Override the minimization algorithm.
    #[arg(short, long, value_enum)]
    pub algorithm: Option<Algorithm>,

    /// Override the iteration cap of the Krylov solve.
    #[arg(short = 'n', long, value_name = "INT")]
    pub max_iterations: Option<usize>,

    /// Override the requested relative reduction of the residual norm.
    #[arg(short, long, value_name = "FLOAT")]
    pub reduction: Option<f64>,

    /// Override the FGMRES preconditioner.
    #[arg(long, value_enum)]
    pub preconditioner: Option<PreconditionerArg>,

    /// Run the adjoint test inside every operator application.
    #[arg(long)]
    pub adjoint_test: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S minimizer.max-iterations=50
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Also check that the balance operator's inverse undoes it.
    #[arg(long)]
    pub test_inverse: bool,

    /// Set a specific configuration value, overriding the config file.
    /// Example: -S diagnostics.adjoint-tolerance=1e-8
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `ensemble` subcommand.
#[derive(Args, Debug)]
pub struct EnsembleArgs {
    /// Path to the ensemble description in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the perturbations CSV. Printed to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Linearize through the balance operator even if the file sets no coupling.
    #[arg(long)]
    pub balanced: bool,
}
