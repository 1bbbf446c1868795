use super::KrylovOutcome;
use crate::core::space::VectorSpace;
use crate::engine::error::EngineError;
use crate::engine::operators::LinearOperator;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{debug, info, instrument};

/// GMRESR: a GCR outer iteration whose search directions come from the preconditioner.
///
/// Solves `A x = b` starting from the incoming `x`. Each iteration forms `z = P r` and
/// `c = A z`, orthogonalizes `c` against the stored images (applying the same combination
/// to `z`), normalizes both by `‖c‖`, and then updates `r -= <c, r> c` and `x += <c, r> z`.
/// Returns the achieved reduction `‖r‖ / ‖r0‖`.
#[instrument(skip(x, b, operator, preconditioner, reporter), name = "gmresr")]
pub fn gmresr<V, A, P>(
    x: &mut V,
    b: &V,
    operator: &mut A,
    preconditioner: &mut P,
    max_iterations: usize,
    tolerance: f64,
    reporter: &ProgressReporter,
) -> Result<KrylovOutcome, EngineError>
where
    V: VectorSpace,
    A: LinearOperator<V>,
    P: LinearOperator<V>,
{
    if b.norm() == 0.0 {
        x.zero();
        debug!("GMRESR: zero right-hand side, returning the zero solution.");
        return Ok(KrylovOutcome::converged_immediately());
    }
    let mut r = super::initial_residual(x, b, operator)?;
    let rnorm0 = r.norm();
    if rnorm0 == 0.0 {
        debug!("GMRESR: initial guess already solves the system.");
        return Ok(KrylovOutcome::converged_immediately());
    }

    reporter.report(Progress::TaskStart {
        total_steps: max_iterations as u64,
    });

    let mut zs: Vec<V> = Vec::with_capacity(max_iterations);
    let mut cs: Vec<V> = Vec::with_capacity(max_iterations);
    let mut reduction = 1.0;
    let mut iterations = 0;

    for iter in 0..max_iterations {
        let mut z = preconditioner.multiply(&r)?;
        let mut c = operator.multiply(&z)?;

        for (cj, zj) in cs.iter().zip(zs.iter()) {
            let alpha = -cj.dot(&c);
            c.axpy(alpha, cj);
            z.axpy(alpha, zj);
        }

        let cnorm = c.norm();
        if cnorm == 0.0 {
            debug!("GMRESR: breakdown at iteration {}, keeping current estimate.", iter + 1);
            break;
        }
        c.scale(1.0 / cnorm);
        z.scale(1.0 / cnorm);

        let rdotc = c.dot(&r);
        r.axpy(-rdotc, &c);
        x.axpy(rdotc, &z);
        cs.push(c);
        zs.push(z);

        iterations = iter + 1;
        reduction = r.norm() / rnorm0;
        debug!("GMRESR iteration {}: residual reduction = {:.6e}", iterations, reduction);
        reporter.report(Progress::Residual {
            iteration: iterations,
            reduction,
        });
        reporter.report(Progress::TaskIncrement);

        if reduction < tolerance {
            break;
        }
    }

    reporter.report(Progress::TaskFinish);
    info!(
        "GMRESR: {} iteration(s), residual norm reduction = {:.6e}",
        iterations, reduction
    );
    Ok(KrylovOutcome {
        reduction,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::operators::IdentityMatrix;
    use nalgebra::{DMatrix, DVector};
    use std::sync::Mutex;

    struct Dense(DMatrix<f64>);

    impl LinearOperator<DVector<f64>> for Dense {
        fn multiply(&mut self, x: &DVector<f64>) -> Result<DVector<f64>, EngineError> {
            Ok(&self.0 * x)
        }
    }

    fn spd(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                4.0 + i as f64
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn solves_spd_system_within_dimension_iterations() {
        let n = 6;
        let matrix = spd(n);
        let b = DVector::from_fn(n, |i, _| (i as f64 + 1.0).sin());
        let mut x = DVector::zeros(n);
        let outcome = gmresr(
            &mut x,
            &b,
            &mut Dense(matrix.clone()),
            &mut IdentityMatrix,
            n,
            1e-12,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert!(outcome.iterations <= n);
        assert!(outcome.reduction < 1e-10);
        assert!((&matrix * &x - &b).norm() < 1e-9);
    }

    #[test]
    fn zero_rhs_gives_zero_solution() {
        let mut x = DVector::from_vec(vec![1.0, 2.0]);
        let b = DVector::zeros(2);
        let outcome = gmresr(
            &mut x,
            &b,
            &mut Dense(spd(2)),
            &mut IdentityMatrix,
            5,
            1e-6,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(outcome.reduction, 0.0);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(x.norm(), 0.0);
    }

    #[test]
    fn stops_at_iteration_cap_with_reduction_in_unit_interval() {
        let n = 8;
        let b = DVector::from_element(n, 1.0);
        let mut x = DVector::zeros(n);
        let outcome = gmresr(
            &mut x,
            &b,
            &mut Dense(spd(n)),
            &mut IdentityMatrix,
            2,
            1e-14,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.reduction > 0.0 && outcome.reduction <= 1.0);
    }

    #[test]
    fn exact_preconditioner_converges_in_one_step() {
        let matrix = spd(4);
        let inverse = matrix.clone().try_inverse().unwrap();
        let b = DVector::from_vec(vec![1.0, -1.0, 2.0, 0.5]);
        let mut x = DVector::zeros(4);
        let outcome = gmresr(
            &mut x,
            &b,
            &mut Dense(matrix),
            &mut Dense(inverse),
            10,
            1e-10,
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn reports_one_residual_per_iteration() {
        let residuals = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Residual { iteration, .. } = event {
                residuals.lock().unwrap().push(iteration);
            }
        }));
        let mut x = DVector::zeros(3);
        gmresr(
            &mut x,
            &DVector::from_element(3, 1.0),
            &mut Dense(spd(3)),
            &mut IdentityMatrix,
            3,
            1e-14,
            &reporter,
        )
        .unwrap();
        drop(reporter);
        let seen = residuals.into_inner().unwrap();
        assert_eq!(seen, (1..=seen.len()).collect::<Vec<_>>());
        assert!(!seen.is_empty());
    }
}
