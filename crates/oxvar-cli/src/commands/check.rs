use crate::cli::CheckArgs;
use crate::config::PartialRunConfig;
use crate::error::{CliError, Result};
use oxvar::core::saddle::SaddlePointVector;
use oxvar::engine::diagnostics::{
    Check, check_covariances, check_operator_symmetry, check_tangent_linear_adjoint,
    check_variable_change, log_checks, state_template,
};
use oxvar::engine::operators::{HessianMatrix, SaddlePointMatrix};
use tracing::info;

pub fn run(args: CheckArgs) -> Result<()> {
    let config = PartialRunConfig::from_file(&args.config)?.merge_check(&args)?;
    let cost = config.problem.cost_function();

    info!("Running consistency checks on {} term(s)...", cost.n_terms());
    let mut checks = vec![Check::Adjoint(check_tangent_linear_adjoint(&cost)?)];

    let mut hessian = HessianMatrix::new(&cost, false);
    checks.push(Check::Adjoint(check_operator_symmetry(
        "Hessian",
        &mut hessian,
        &cost.new_increment(),
    )?));

    let mut saddle = SaddlePointMatrix::new(&cost, false);
    let template = SaddlePointVector::new(cost.new_increment(), cost.new_dual());
    checks.push(Check::Adjoint(check_operator_symmetry(
        "SaddlePoint",
        &mut saddle,
        &template,
    )?));

    checks.extend(check_covariances(&cost)?);
    checks.extend(check_variable_change(
        &config.balance,
        &state_template(&cost),
        &config.diagnostics,
    )?);

    for check in &checks {
        let mark = if check.passes(&config.diagnostics) { "✓" } else { "✗" };
        println!("{} {}", mark, check);
    }

    let failed = log_checks(&checks, &config.diagnostics);
    if failed > 0 {
        return Err(CliError::ChecksFailed {
            failed,
            total: checks.len(),
        });
    }
    println!("All {} checks passed.", checks.len());
    Ok(())
}
