use crate::core::control::ControlIncrement;
use crate::core::dual::DualVector;
use crate::core::saddle::SaddlePointVector;
use crate::core::space::VectorSpace;
use crate::engine::config::{MinimizerConfig, MinimizerKind, Preconditioner};
use crate::engine::cost::CostFunction;
use crate::engine::error::EngineError;
use crate::engine::operators::{
    BMatrix, HessianMatrix, IdentityMatrix, SaddlePointMatrix, SaddlePointPrecondMatrix,
};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::solvers::{FgmresOptions, KrylovOutcome, SearchDirections, fgmres, gmresr};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct MinimizerOutcome<I> {
    pub increment: ControlIncrement<I>,
    /// Final residual norm divided by the initial one.
    pub reduction: f64,
    pub iterations: usize,
}

pub trait Minimizer<I: VectorSpace, D: VectorSpace> {
    fn name(&self) -> &'static str;

    fn minimize(
        &mut self,
        cost: &CostFunction<I, D>,
        reporter: &ProgressReporter,
    ) -> Result<MinimizerOutcome<I>, EngineError>;
}

/// Solves the saddle-point formulation with GMRESR and the inexact-constraint
/// preconditioner.
#[derive(Debug, Clone)]
pub struct SaddlePointMinimizer {
    config: MinimizerConfig,
}

impl SaddlePointMinimizer {
    pub fn new(config: MinimizerConfig) -> Self {
        Self { config }
    }
}

impl<I: VectorSpace, D: VectorSpace> Minimizer<I, D> for SaddlePointMinimizer {
    fn name(&self) -> &'static str {
        MinimizerKind::SaddlePoint.name()
    }

    #[instrument(skip_all, name = "saddle_point_minimizer")]
    fn minimize(
        &mut self,
        cost: &CostFunction<I, D>,
        reporter: &ProgressReporter,
    ) -> Result<MinimizerOutcome<I>, EngineError> {
        let config = &self.config;
        info!(
            "SaddlePointMinimizer: max iter = {}, requested norm reduction = {}",
            config.max_iterations, config.gradient_norm_reduction
        );

        let mut x = SaddlePointVector::new(cost.new_increment(), cost.new_dual());

        let mut lambda = DualVector::with_dx(cost.background().first_guess());
        for term in cost.terms() {
            let dy = term
                .multiply_covar(&term.new_gradient_fg())
                .map_err(|e| EngineError::term(term.name(), e))?;
            lambda.append(dy);
        }
        let mut rhs = SaddlePointVector::new(cost.new_increment(), lambda);
        rhs *= -1.0;

        let mut matrix = SaddlePointMatrix::new(cost, config.online_adjoint_test);
        let mut precond = SaddlePointPrecondMatrix::new(cost);
        let KrylovOutcome {
            reduction,
            iterations,
        } = gmresr(
            &mut x,
            &rhs,
            &mut matrix,
            &mut precond,
            config.max_iterations,
            config.gradient_norm_reduction,
            reporter,
        )?;

        info!(
            "SaddlePointMinimizer: reduction in residual norm = {:.4}",
            reduction
        );
        let (increment, _) = x.into_parts();
        Ok(MinimizerOutcome {
            increment,
            reduction,
            iterations,
        })
    }
}

/// Solves the primal Hessian system `(B⁻¹ + HᵗR⁻¹H) dx = -∇J(fg)` with flexible GMRES.
///
/// Search directions are kept across successive calls when the configuration asks for
/// recycling.
pub struct FgmresMinimizer<I> {
    config: MinimizerConfig,
    memory: Option<SearchDirections<ControlIncrement<I>>>,
}

impl<I: VectorSpace> FgmresMinimizer<I> {
    pub fn new(config: MinimizerConfig) -> Self {
        let memory = (config.recycled_directions > 0)
            .then(|| SearchDirections::new(config.recycled_directions));
        Self { config, memory }
    }

    pub fn recycled(&self) -> usize {
        self.memory.as_ref().map_or(0, |m| m.len())
    }
}

impl<I: VectorSpace, D: VectorSpace> Minimizer<I, D> for FgmresMinimizer<I> {
    fn name(&self) -> &'static str {
        MinimizerKind::Fgmres.name()
    }

    #[instrument(skip_all, name = "fgmres_minimizer")]
    fn minimize(
        &mut self,
        cost: &CostFunction<I, D>,
        reporter: &ProgressReporter,
    ) -> Result<MinimizerOutcome<I>, EngineError> {
        let config = &self.config;
        info!(
            "FgmresMinimizer: max iter = {}, requested norm reduction = {}",
            config.max_iterations, config.gradient_norm_reduction
        );

        let mut rhs = cost.compute_gradient_fg()?;
        rhs *= -1.0;

        let mut x = cost.new_increment();
        let mut hessian = HessianMatrix::new(cost, config.online_adjoint_test);
        let options = FgmresOptions::new(config.max_iterations, config.gradient_norm_reduction)
            .with_restart(config.restart);
        let memory = self.memory.as_mut();
        let outcome = match config.preconditioner {
            Preconditioner::Identity => fgmres(
                &mut x,
                &rhs,
                &mut hessian,
                &mut IdentityMatrix,
                options,
                memory,
                reporter,
            )?,
            Preconditioner::Background => fgmres(
                &mut x,
                &rhs,
                &mut hessian,
                &mut BMatrix::new(cost.background()),
                options,
                memory,
                reporter,
            )?,
        };

        info!(
            "FgmresMinimizer: reduction in residual norm = {:.4}",
            outcome.reduction
        );
        Ok(MinimizerOutcome {
            increment: x,
            reduction: outcome.reduction,
            iterations: outcome.iterations,
        })
    }
}

/// Runs the minimizer selected by `config.algorithm` once.
pub fn run<I: VectorSpace, D: VectorSpace>(
    cost: &CostFunction<I, D>,
    config: &MinimizerConfig,
    reporter: &ProgressReporter,
) -> Result<MinimizerOutcome<I>, EngineError> {
    reporter.report(Progress::PhaseStart {
        name: config.algorithm.name(),
    });
    let outcome = match config.algorithm {
        MinimizerKind::SaddlePoint => {
            SaddlePointMinimizer::new(config.clone()).minimize(cost, reporter)
        }
        MinimizerKind::Fgmres => FgmresMinimizer::new(config.clone()).minimize(cost, reporter),
    }?;
    reporter.report(Progress::PhaseFinish);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::MinimizerConfigBuilder;
    use crate::engine::operators::LinearOperator;
    use crate::toy::model::{Diverged, DivergingModel};
    use crate::toy::{ToyProblem, ToyProblemSpec};
    use nalgebra::{DMatrix, DVector};

    fn scalar_problem() -> ToyProblem {
        let spec: ToyProblemSpec = toml::from_str(
            r#"
            size = 3
            steps = 0
            advection = 1.0

            [background]
            values = [1.0, 2.0, 3.0]
            variances = [1.0, 1.0, 1.0]

            [[observations]]
            name = "Everywhere"
            variance = 3.0
            points = [
                { step = 0, index = 0, value = 5.0 },
                { step = 0, index = 1, value = 2.0 },
                { step = 0, index = 2, value = -1.0 },
            ]
            "#,
        )
        .unwrap();
        ToyProblem::from_spec(&spec).unwrap()
    }

    fn advection_problem() -> ToyProblem {
        let spec: ToyProblemSpec = toml::from_str(
            r#"
            size = 5
            steps = 3
            advection = 0.75

            [background]
            values = [0.0, 0.5, 1.0, 0.5, 0.0]
            variances = [1.0, 0.8, 0.6, 0.8, 1.0]
            first-guess = [0.1, 0.4, 1.1, 0.6, -0.1]

            [[observations]]
            name = "Stations"
            variance = 0.2
            bias-variance = 0.3
            points = [
                { step = 0, index = 2, value = 1.4 },
                { step = 1, index = 3, value = 0.2 },
                { step = 3, index = 0, value = 0.9 },
            ]

            [[observations]]
            name = "Aircraft"
            variance = 0.5
            points = [{ step = 2, index = 1, value = -0.3 }]
            "#,
        )
        .unwrap();
        ToyProblem::from_spec(&spec).unwrap()
    }

    fn config(kind: MinimizerKind) -> MinimizerConfig {
        MinimizerConfigBuilder::new()
            .algorithm(kind)
            .max_iterations(40)
            .gradient_norm_reduction(1e-12)
            .build()
            .unwrap()
    }

    /// Flattens a control increment with at most one auxiliary slot.
    fn flatten(dx: &ControlIncrement<DVector<f64>>) -> DVector<f64> {
        let mut values: Vec<f64> = dx.state().iter().copied().collect();
        if let Some(aux) = dx.aux(0) {
            values.extend(aux.iter());
        }
        DVector::from_vec(values)
    }

    /// Dense solution of the Hessian system, assembled column by column.
    fn dense_solution(cost: &CostFunction<DVector<f64>, DVector<f64>>) -> DVector<f64> {
        let template = cost.new_increment();
        let n = flatten(&template).len();
        let mut hessian = HessianMatrix::new(cost, false);
        let mut dense = DMatrix::zeros(n, n);
        for k in 0..n {
            let mut e = template.clone();
            if k < template.state().len() {
                e.state_mut()[k] = 1.0;
            } else {
                e.aux_mut(0).unwrap()[k - template.state().len()] = 1.0;
            }
            dense.set_column(k, &flatten(&hessian.multiply(&e).unwrap()));
        }
        let gradient = flatten(&cost.compute_gradient_fg().unwrap());
        dense.cholesky().unwrap().solve(&(-gradient))
    }

    #[test]
    fn saddle_point_matches_scalar_analytic_solution() {
        // dx_i = b / (b + r) (y_i - xb_i) with b = 1, r = 3.
        let cost = scalar_problem().cost_function();
        let outcome = run(&cost, &config(MinimizerKind::SaddlePoint), &ProgressReporter::new())
            .unwrap();
        let expected = DVector::from_vec(vec![1.0, 0.0, -1.0]);
        assert!((outcome.increment.state() - expected).norm() < 1e-9);
        assert!(outcome.reduction < 1e-12);
    }

    #[test]
    fn fgmres_matches_scalar_analytic_solution() {
        let cost = scalar_problem().cost_function();
        let outcome =
            run(&cost, &config(MinimizerKind::Fgmres), &ProgressReporter::new()).unwrap();
        let expected = DVector::from_vec(vec![1.0, 0.0, -1.0]);
        assert!((outcome.increment.state() - expected).norm() < 1e-9);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn both_minimizers_agree_with_dense_solution() {
        let cost = advection_problem().cost_function();
        let expected = dense_solution(&cost);
        for kind in [MinimizerKind::SaddlePoint, MinimizerKind::Fgmres] {
            let outcome = run(&cost, &config(kind), &ProgressReporter::new()).unwrap();
            let error = (flatten(&outcome.increment) - &expected).norm();
            assert!(error < 1e-8, "{} is off by {}", kind.name(), error);
        }
    }

    #[test]
    fn background_preconditioner_reaches_the_same_solution() {
        let cost = advection_problem().cost_function();
        let expected = dense_solution(&cost);
        let config = MinimizerConfigBuilder::new()
            .algorithm(MinimizerKind::Fgmres)
            .preconditioner(Preconditioner::Background)
            .max_iterations(60)
            .gradient_norm_reduction(1e-12)
            .online_adjoint_test(true)
            .build()
            .unwrap();
        let outcome = run(&cost, &config, &ProgressReporter::new()).unwrap();
        assert!((flatten(&outcome.increment) - expected).norm() < 1e-8);
    }

    #[test]
    fn recycling_warm_starts_repeated_minimizations() {
        let cost = advection_problem().cost_function();
        let config = MinimizerConfigBuilder::new()
            .algorithm(MinimizerKind::Fgmres)
            .max_iterations(40)
            .gradient_norm_reduction(1e-10)
            .recycled_directions(16)
            .build()
            .unwrap();
        let mut minimizer = FgmresMinimizer::new(config);
        let reporter = ProgressReporter::new();

        let first = minimizer.minimize(&cost, &reporter).unwrap();
        assert!(first.iterations > 0);
        assert_eq!(minimizer.recycled(), first.iterations);

        let second = minimizer.minimize(&cost, &reporter).unwrap();
        assert_eq!(second.iterations, 0);
        assert!((flatten(&second.increment) - flatten(&first.increment)).norm() < 1e-8);
    }

    #[test]
    fn iteration_cap_bounds_the_solve() {
        let cost = advection_problem().cost_function();
        let config = MinimizerConfigBuilder::new()
            .algorithm(MinimizerKind::SaddlePoint)
            .max_iterations(2)
            .build()
            .unwrap();
        let outcome = run(&cost, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.reduction > 0.0 && outcome.reduction <= 1.0);
    }

    #[test]
    fn integration_failure_aborts_both_minimizers() {
        for kind in [MinimizerKind::SaddlePoint, MinimizerKind::Fgmres] {
            let model = DivergingModel::default();
            let cost = advection_problem().cost_function_with_runner(Box::new(model.clone()));
            let err = run(&cost, &config(kind), &ProgressReporter::new())
                .err()
                .expect("must fail");

            let source = match err {
                EngineError::Integration(source) => source,
                other => panic!("{kind:?}: expected an integration error, got {other:?}"),
            };
            assert!(source.is::<Diverged>());
            assert_eq!(model.calls(), 1, "{kind:?}");
        }
    }
}
