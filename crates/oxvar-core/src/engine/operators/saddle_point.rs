use super::LinearOperator;
use crate::core::control::ControlIncrement;
use crate::core::dual::DualVector;
use crate::core::saddle::SaddlePointVector;
use crate::core::space::VectorSpace;
use crate::engine::cost::{BACKGROUND_TERM, CostFunction};
use crate::engine::diagnostics::AdjointTestReport;
use crate::engine::error::EngineError;
use crate::engine::observers::{AdjointObservers, TangentLinearObservers};
use tracing::{info, instrument};

/// The saddle-point matrix `[[D, L], [Lᵗ, 0]]` with `D = diag(B, R)` and `L = [I; H]`.
///
/// For `x = (dx, λ)` the product is
/// `y.λ.dx = B λ.dx + dx`, `y.λ_j = R_j λ_j + H_j dx` and `y.dx = λ.dx + Σ H_jᵗ λ_j`.
pub struct SaddlePointMatrix<'c, I: VectorSpace, D: VectorSpace> {
    cost: &'c CostFunction<I, D>,
    self_test: bool,
    iteration: usize,
}

impl<'c, I: VectorSpace, D: VectorSpace> SaddlePointMatrix<'c, I, D> {
    pub fn new(cost: &'c CostFunction<I, D>, self_test: bool) -> Self {
        Self {
            cost,
            self_test,
            iteration: 0,
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }
}

fn lambda_dx<I: VectorSpace, D: VectorSpace>(
    lambda: &DualVector<I, D>,
) -> Result<&ControlIncrement<I>, EngineError> {
    lambda.dx().ok_or_else(|| {
        EngineError::Structure("saddle-point multipliers carry no background slot".to_string())
    })
}

impl<I: VectorSpace, D: VectorSpace> LinearOperator<SaddlePointVector<I, D>>
    for SaddlePointMatrix<'_, I, D>
{
    #[instrument(skip_all, name = "saddle_point", fields(iteration = self.iteration))]
    fn multiply(
        &mut self,
        x: &SaddlePointVector<I, D>,
    ) -> Result<SaddlePointVector<I, D>, EngineError> {
        let cost = self.cost;
        let background = cost.background();
        let lambda = x.lambda();
        cost.check_dual(lambda)?;
        let lambda_bg = lambda_dx(lambda)?;

        let mut tl = TangentLinearObservers::new();
        if let Some(hook) = background.initialize_tl() {
            tl.set_background(hook);
        }
        for term in cost.terms() {
            tl.push(term.setup_tl(x.dx()));
        }
        let mut ww = x.dx().clone();
        cost.run_tlm(&mut ww, &mut tl)?;

        // Background row: B λ.dx + dx.
        let jq = tl.release_background();
        let mut dw = cost.new_increment();
        background
            .finalize_tl(jq, x.dx(), &mut dw)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;
        let mut y_bg = background
            .multiply_b(lambda_bg)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;
        y_bg += &dw;
        let mut y_lambda = DualVector::with_dx(y_bg);

        // Term rows: R_j λ_j + H_j dx, with λ_j forcing the adjoint run.
        let mut ad = AdjointObservers::new();
        let mut forward = 0.0;
        for (j, term) in cost.terms().enumerate() {
            let hdx = tl.release_output(j)?;
            let mut row = term
                .multiply_covar(&lambda[j])
                .map_err(|e| EngineError::term(term.name(), e))?;
            if self.self_test {
                forward += hdx.dot(&lambda[j]);
            }
            row.axpy(1.0, &hdx);
            y_lambda.append(row);
            ad.push(term.setup_ad(lambda[j].clone()));
        }
        drop(tl);

        // Primal row: λ.dx + Hᵗλ.
        let mut y_dx = cost.new_increment();
        if let Some(hook) = background.initialize_ad(&mut y_dx, lambda_bg) {
            ad.set_background(hook);
        }
        let mut htl = cost.new_increment();
        cost.run_adj(&mut htl, &mut ad)?;
        y_dx += &htl;
        let contribution = ad.release_background();
        background
            .finalize_ad(contribution, &mut y_dx)
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;

        if self.self_test {
            let report = AdjointTestReport::new(
                format!("SaddlePoint iteration {}", self.iteration),
                forward,
                x.dx().dot(&htl),
            );
            info!("{}", report);
        }
        self.iteration += 1;
        Ok(SaddlePointVector::new(y_dx, y_lambda))
    }
}

/// Inexact-constraint preconditioner for the saddle-point system.
///
/// For `x = (dx, λ)` the product `z` is
/// `z.λ.dx = dx`, `z.λ_j = R_j⁻¹ λ_j` and `z.dx = λ.dx - B dx`. No model integration is
/// needed.
pub struct SaddlePointPrecondMatrix<'c, I: VectorSpace, D: VectorSpace> {
    cost: &'c CostFunction<I, D>,
}

impl<'c, I: VectorSpace, D: VectorSpace> SaddlePointPrecondMatrix<'c, I, D> {
    pub fn new(cost: &'c CostFunction<I, D>) -> Self {
        Self { cost }
    }
}

impl<I: VectorSpace, D: VectorSpace> LinearOperator<SaddlePointVector<I, D>>
    for SaddlePointPrecondMatrix<'_, I, D>
{
    fn multiply(
        &mut self,
        x: &SaddlePointVector<I, D>,
    ) -> Result<SaddlePointVector<I, D>, EngineError> {
        let cost = self.cost;
        let lambda = x.lambda();
        cost.check_dual(lambda)?;

        let mut z_lambda = DualVector::with_dx(x.dx().clone());
        for (j, term) in cost.terms().enumerate() {
            let weighted = term
                .multiply_co_inv(&lambda[j])
                .map_err(|e| EngineError::term(term.name(), e))?;
            z_lambda.append(weighted);
        }

        let mut z_dx = lambda_dx(lambda)?.clone();
        let b_dx = cost
            .background()
            .multiply_b(x.dx())
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;
        z_dx -= &b_dx;
        Ok(SaddlePointVector::new(z_dx, z_lambda))
    }
}
