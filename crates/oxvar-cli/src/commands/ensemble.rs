use crate::cli::EnsembleArgs;
use crate::config::DefaultsConfig;
use crate::error::{CliError, Result};
use crate::output;
use oxvar::toy::{ToyBalance, ToyEnsemble, ToyEnsembleSpec};
use tracing::{debug, info};

pub fn run(args: EnsembleArgs) -> Result<()> {
    debug!("Loading ensemble description from file: {:?}", &args.config);
    let content = std::fs::read_to_string(&args.config)?;
    let spec = ToyEnsembleSpec::parse(&content).map_err(|e| CliError::FileParsing {
        path: args.config.clone(),
        source: e.into(),
    })?;

    let mut ensemble = ToyEnsemble::from_spec(&spec)?;
    if args.balanced && ensemble.balance.is_none() {
        let coupling = DefaultsConfig::default().balance_coupling;
        info!("No coupling in file; using default balance coupling {}.", coupling);
        ensemble.balance = Some(ToyBalance::new(coupling));
    }

    let linearized = ensemble.linearize()?;
    let names: Vec<String> = ensemble
        .config
        .sources
        .iter()
        .map(|s| s.name.clone())
        .collect();
    output::write_perturbations(args.output.as_deref(), &names, linearized.perturbations())?;

    eprintln!(
        "Linearized {} member(s) valid at {}.",
        linearized.len(),
        linearized.valid_time()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    const ENSEMBLE: &str = r#"
        valid-time = 2020-01-01T00:00:00Z
        size = 2
        background = [0.0, 0.0]

        [[members]]
        name = "mem001"
        values = [1.0, 3.0]

        [[members]]
        name = "mem002"
        values = [3.0, 1.0]
    "#;

    fn run_with(content: &str, extra: &[&str]) -> Result<Vec<String>> {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("ensemble.toml");
        let output = dir.path().join("perturbations.csv");
        std::fs::write(&config, content).unwrap();
        let mut argv = vec![
            "oxvar".to_string(),
            "ensemble".to_string(),
            "-c".to_string(),
            config.to_str().unwrap().to_string(),
            "-o".to_string(),
            output.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let Commands::Ensemble(args) = Cli::parse_from(argv).command else {
            panic!("Expected 'ensemble' subcommand");
        };
        run(args)?;
        Ok(std::fs::read_to_string(output)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect())
    }

    #[test]
    fn writes_recentred_perturbations() {
        let lines = run_with(ENSEMBLE, &[]).unwrap();
        assert_eq!(lines, vec!["index,mem001,mem002", "0,-1,1", "1,1,-1"]);
    }

    #[test]
    fn balanced_flag_uses_default_coupling() {
        // Anomalies (-1, 1) and (1, -1) through K⁻¹ with c = 0.5.
        let lines = run_with(ENSEMBLE, &["--balanced"]).unwrap();
        assert_eq!(lines, vec!["index,mem001,mem002", "0,-1,1", "1,1.5,-1.5"]);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = run_with("valid-time = \"yesterday\"\n", &[]).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { .. }));
    }
}
