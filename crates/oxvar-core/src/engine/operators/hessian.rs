use super::LinearOperator;
use crate::core::control::ControlIncrement;
use crate::core::space::VectorSpace;
use crate::engine::cost::{BACKGROUND_TERM, CostFunction};
use crate::engine::diagnostics::AdjointTestReport;
use crate::engine::error::EngineError;
use crate::engine::observers::{AdjointObservers, TangentLinearObservers};
use tracing::{info, instrument, trace};

/// The Hessian of the incremental cost function, `B⁻¹ + HᵗR⁻¹H`.
///
/// Every application performs exactly one tangent-linear and one adjoint integration.
pub struct HessianMatrix<'c, I: VectorSpace, D: VectorSpace> {
    cost: &'c CostFunction<I, D>,
    self_test: bool,
    iteration: usize,
}

impl<'c, I: VectorSpace, D: VectorSpace> HessianMatrix<'c, I, D> {
    pub fn new(cost: &'c CostFunction<I, D>, self_test: bool) -> Self {
        Self {
            cost,
            self_test,
            iteration: 0,
        }
    }

    /// Number of completed applications.
    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

impl<I: VectorSpace, D: VectorSpace> LinearOperator<ControlIncrement<I>>
    for HessianMatrix<'_, I, D>
{
    #[instrument(skip_all, name = "hessian", fields(iteration = self.iteration))]
    fn multiply(&mut self, dx: &ControlIncrement<I>) -> Result<ControlIncrement<I>, EngineError> {
        let cost = self.cost;
        let background = cost.background();

        // Tangent-linear pass: H dx for every term.
        let mut tl = TangentLinearObservers::new();
        if let Some(hook) = background.initialize_tl() {
            tl.set_background(hook);
        }
        for term in cost.terms() {
            tl.push(term.setup_tl(dx));
        }
        let mut ww = dx.clone();
        cost.run_tlm(&mut ww, &mut tl)?;

        let jq = tl.release_background();
        let mut dw = cost.new_increment();
        background
            .finalize_tl(jq, dx, &mut dw)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;
        let binv_dw = background
            .multiply_binv(&dw)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;

        let mut dz = cost.new_increment();
        let mut ad = AdjointObservers::new();
        if let Some(hook) = background.initialize_ad(&mut dz, &binv_dw) {
            ad.set_background(hook);
        }

        let mut forward = 0.0;
        for (j, term) in cost.terms().enumerate() {
            let hdx = tl.release_output(j)?;
            let weighted = term
                .multiply_co_inv(&hdx)
                .map_err(|e| EngineError::term(term.name(), e))?;
            if self.self_test {
                forward += hdx.dot(&weighted);
            }
            ad.push(term.setup_ad(weighted));
        }
        drop(tl);

        // Adjoint pass: HᵗR⁻¹H dx.
        dw.zero();
        cost.run_adj(&mut dw, &mut ad)?;
        dz += &dw;
        let contribution = ad.release_background();
        background
            .finalize_ad(contribution, &mut dz)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;

        if self.self_test {
            let report = AdjointTestReport::new(
                format!("Hessian iteration {}", self.iteration),
                forward,
                dx.dot(&dw),
            );
            info!("{}", report);
        }
        trace!("Hessian application {} complete.", self.iteration);
        self.iteration += 1;
        Ok(dz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::diagnostics::check_operator_symmetry;
    use crate::toy::model::{Diverged, DivergingModel};
    use crate::toy::{ToyProblem, ToyProblemSpec};
    use nalgebra::{DMatrix, DVector};

    fn identity_problem() -> ToyProblem {
        // Identity model, every point observed once: H = I restricted to observed indices.
        let spec: ToyProblemSpec = toml::from_str(
            r#"
            size = 3
            steps = 0
            advection = 1.0

            [background]
            values = [0.0, 0.0, 0.0]
            variances = [2.0, 4.0, 0.5]

            [[observations]]
            name = "A"
            variance = 0.25
            points = [{ step = 0, index = 0, value = 1.0 }, { step = 0, index = 1, value = 1.0 }]

            [[observations]]
            name = "B"
            variance = 1.0
            points = [{ step = 0, index = 1, value = 1.0 }]
            "#,
        )
        .unwrap();
        ToyProblem::from_spec(&spec).unwrap()
    }

    fn advection_problem() -> ToyProblem {
        let spec: ToyProblemSpec = toml::from_str(
            r#"
            size = 6
            steps = 3
            advection = 0.6

            [background]
            values = [0.0, 1.0, 0.0, -1.0, 0.5, 0.0]
            variances = [1.0, 1.0, 2.0, 2.0, 1.0, 0.5]

            [[observations]]
            name = "Sondes"
            variance = 0.3
            bias-variance = 0.1
            points = [
                { step = 0, index = 1, value = 1.2 },
                { step = 2, index = 4, value = 0.1 },
                { step = 3, index = 0, value = -0.4 },
            ]
            "#,
        )
        .unwrap();
        ToyProblem::from_spec(&spec).unwrap()
    }

    #[test]
    fn matches_analytic_hessian_with_identity_dynamics() {
        let cost = identity_problem().cost_function();
        let mut hessian = HessianMatrix::new(&cost, false);
        let dx = ControlIncrement::new(DVector::from_vec(vec![1.0, -2.0, 3.0]));
        let dz = hessian.multiply(&dx).unwrap();

        // B⁻¹ = diag(0.5, 0.25, 2); HᵗR⁻¹H = diag(4, 4 + 1, 0).
        let expected = DVector::from_vec(vec![(0.5 + 4.0) * 1.0, (0.25 + 5.0) * -2.0, 2.0 * 3.0]);
        assert!((dz.state() - expected).norm() < 1e-12);
        assert_eq!(hessian.iteration(), 1);
    }

    #[test]
    fn zero_input_gives_exactly_zero_output() {
        let cost = advection_problem().cost_function();
        let mut hessian = HessianMatrix::new(&cost, true);
        let dz = hessian.multiply(&cost.new_increment()).unwrap();
        assert_eq!(dz.norm(), 0.0);
    }

    #[test]
    fn is_symmetric_with_advection_and_bias() {
        let cost = advection_problem().cost_function();
        let mut hessian = HessianMatrix::new(&cost, true);
        let report =
            check_operator_symmetry("Hessian", &mut hessian, &cost.new_increment()).unwrap();
        assert!(report.passes(1e-10), "{}", report);
        assert_eq!(hessian.iteration(), 2);
    }

    #[test]
    fn dense_assembly_is_symmetric_positive_definite() {
        let cost = advection_problem().cost_function();
        let mut hessian = HessianMatrix::new(&cost, false);
        let template = cost.new_increment();
        let n = template.state().len() + 1;
        let mut dense = DMatrix::zeros(n, n);
        for k in 0..n {
            let mut e = template.clone();
            if k < n - 1 {
                e.state_mut()[k] = 1.0;
            } else {
                e.aux_mut(0).unwrap()[0] = 1.0;
            }
            let col = hessian.multiply(&e).unwrap();
            for i in 0..n - 1 {
                dense[(i, k)] = col.state()[i];
            }
            dense[(n - 1, k)] = col.aux(0).unwrap()[0];
        }
        assert!((&dense - dense.transpose()).amax() < 1e-12);
        assert!(dense.cholesky().is_some());
    }

    #[test]
    fn integration_failure_propagates_with_its_source() {
        let model = DivergingModel::default();
        let cost = advection_problem().cost_function_with_runner(Box::new(model.clone()));
        let mut hessian = HessianMatrix::new(&cost, true);
        let err = hessian.multiply(&cost.new_increment()).err().expect("must fail");

        let source = match err {
            EngineError::Integration(source) => source,
            other => panic!("expected an integration error, got {other:?}"),
        };
        assert!(source.is::<Diverged>());
        assert_eq!(model.calls(), 1);
        assert_eq!(hessian.iteration(), 0);
    }
}
