use crate::cli::SolveArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::output;
use crate::utils::progress::CliProgressHandler;
use oxvar::engine::progress::ProgressReporter;
use oxvar::workflows;
use tracing::{info, warn};

pub fn run(args: SolveArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_solve(&args)?;

    let cost = config.problem.cost_function();
    info!(
        "Assembled cost function with {} observation term(s): {:?}",
        cost.n_terms(),
        config.problem.term_names()
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    eprintln!("Starting minimization ({})...", config.minimizer.algorithm.name());
    let outcome = workflows::minimize::run(&cost, &config.minimizer, &reporter)?;

    if outcome.reduction > config.minimizer.gradient_norm_reduction {
        warn!(
            "Requested reduction {} not reached after {} iteration(s); achieved {:.4e}.",
            config.minimizer.gradient_norm_reduction, outcome.iterations, outcome.reduction
        );
    }
    eprintln!(
        "Finished after {} iteration(s), residual reduction {:.4e}.",
        outcome.iterations, outcome.reduction
    );

    let analysis = config.problem.analysis(&outcome.increment)?;
    output::write_increment(args.output.as_deref(), &outcome.increment, &analysis)?;
    if let Some(path) = &args.output {
        eprintln!("✓ Analysis increment written to: {}", path.display());
    }
    Ok(())
}
