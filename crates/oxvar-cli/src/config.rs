mod defaults;
mod models;

pub use defaults::DefaultsConfig;
pub use models::{CheckConfig, SolveConfig};

use crate::cli::{Algorithm, CheckArgs, PreconditionerArg, SolveArgs};
use crate::error::{CliError, Result};
use clap::ValueEnum;
use oxvar::engine::config::{DiagnosticsConfigBuilder, MinimizerConfigBuilder};
use oxvar::toy::{ToyBalance, ToyProblem, ToyProblemSpec};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMinimizerConfig {
    algorithm: Option<Algorithm>,
    max_iterations: Option<usize>,
    reduction: Option<f64>,
    online_adjoint_test: Option<bool>,
    preconditioner: Option<PreconditionerArg>,
    restart: Option<usize>,
    recycled_directions: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDiagnosticsConfig {
    adjoint_tolerance: Option<f64>,
    test_inverse: Option<bool>,
    inverse_tolerance: Option<f64>,
    balance_coupling: Option<f64>,
}

/// A run configuration file: the problem plus optional solver and diagnostics sections.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    problem: Option<ToyProblemSpec>,
    minimizer: Option<PartialMinimizerConfig>,
    diagnostics: Option<PartialDiagnosticsConfig>,
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn parse_enum<T: ValueEnum>(key: &str, value: &str) -> Result<T> {
    T::from_str(value, true)
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn take_problem(&mut self) -> Result<ToyProblem> {
        let spec = self
            .problem
            .take()
            .ok_or_else(|| CliError::Config("`problem` section is required.".to_string()))?;
        Ok(ToyProblem::from_spec(&spec)?)
    }

    pub fn merge_solve(mut self, args: &SolveArgs) -> Result<SolveConfig> {
        self.apply_set_values(&args.set_values)?;
        let defaults = DefaultsConfig::default();
        let problem = self.take_problem()?;
        let file = self.minimizer.take().unwrap_or_default();

        let algorithm = args
            .algorithm
            .or(file.algorithm)
            .unwrap_or(defaults.algorithm);
        let preconditioner = args
            .preconditioner
            .or(file.preconditioner)
            .unwrap_or(defaults.preconditioner);

        let mut builder = MinimizerConfigBuilder::new()
            .algorithm(algorithm.into())
            .max_iterations(
                args.max_iterations
                    .or(file.max_iterations)
                    .unwrap_or(defaults.max_iterations),
            )
            .gradient_norm_reduction(
                args.reduction
                    .or(file.reduction)
                    .unwrap_or(defaults.reduction),
            )
            .online_adjoint_test(args.adjoint_test || file.online_adjoint_test.unwrap_or(false))
            .preconditioner(preconditioner.into())
            .recycled_directions(
                file.recycled_directions
                    .unwrap_or(defaults.recycled_directions),
            );
        if let Some(restart) = file.restart {
            builder = builder.restart(restart);
        }

        let minimizer = builder
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(SolveConfig { problem, minimizer })
    }

    pub fn merge_check(mut self, args: &CheckArgs) -> Result<CheckConfig> {
        self.apply_set_values(&args.set_values)?;
        let defaults = DefaultsConfig::default();
        let problem = self.take_problem()?;
        let file = self.diagnostics.take().unwrap_or_default();

        let diagnostics = DiagnosticsConfigBuilder::new()
            .adjoint_tolerance(
                file.adjoint_tolerance
                    .unwrap_or(defaults.adjoint_tolerance),
            )
            .inverse_tolerance(
                file.inverse_tolerance
                    .unwrap_or(defaults.inverse_tolerance),
            )
            .test_inverse(args.test_inverse || file.test_inverse.unwrap_or(false))
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;
        let balance = ToyBalance::new(
            file.balance_coupling
                .unwrap_or(defaults.balance_coupling),
        );

        Ok(CheckConfig {
            problem,
            diagnostics,
            balance,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "minimizer.algorithm" => {
                    self.minimizer.get_or_insert_with(Default::default).algorithm =
                        Some(parse_enum(key, value)?);
                }
                "minimizer.max-iterations" => {
                    self.minimizer.get_or_insert_with(Default::default).max_iterations =
                        Some(parse_value(key, value, "integer")?);
                }
                "minimizer.reduction" => {
                    self.minimizer.get_or_insert_with(Default::default).reduction =
                        Some(parse_value(key, value, "float")?);
                }
                "minimizer.online-adjoint-test" => {
                    self.minimizer.get_or_insert_with(Default::default).online_adjoint_test =
                        Some(parse_value(key, value, "boolean")?);
                }
                "minimizer.preconditioner" => {
                    self.minimizer.get_or_insert_with(Default::default).preconditioner =
                        Some(parse_enum(key, value)?);
                }
                "minimizer.restart" => {
                    self.minimizer.get_or_insert_with(Default::default).restart =
                        Some(parse_value(key, value, "integer")?);
                }
                "minimizer.recycled-directions" => {
                    self.minimizer.get_or_insert_with(Default::default).recycled_directions =
                        Some(parse_value(key, value, "integer")?);
                }
                "diagnostics.adjoint-tolerance" => {
                    self.diagnostics.get_or_insert_with(Default::default).adjoint_tolerance =
                        Some(parse_value(key, value, "float")?);
                }
                "diagnostics.inverse-tolerance" => {
                    self.diagnostics.get_or_insert_with(Default::default).inverse_tolerance =
                        Some(parse_value(key, value, "float")?);
                }
                "diagnostics.test-inverse" => {
                    self.diagnostics.get_or_insert_with(Default::default).test_inverse =
                        Some(parse_value(key, value, "boolean")?);
                }
                "diagnostics.balance-coupling" => {
                    self.diagnostics.get_or_insert_with(Default::default).balance_coupling =
                        Some(parse_value(key, value, "float")?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
