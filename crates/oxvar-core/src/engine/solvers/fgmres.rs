use super::KrylovOutcome;
use super::recycling::SearchDirections;
use crate::core::space::VectorSpace;
use crate::engine::error::EngineError;
use crate::engine::operators::LinearOperator;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FgmresOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Krylov basis length before a restart. `None` never restarts.
    pub restart: Option<usize>,
}

impl FgmresOptions {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            restart: None,
        }
    }

    pub fn with_restart(mut self, restart: Option<usize>) -> Self {
        self.restart = restart;
        self
    }
}

fn givens(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else {
        let r = a.hypot(b);
        (a / r, b / r)
    }
}

/// Flexible right-preconditioned GMRES.
///
/// The preconditioned directions `z_j = P v_j` are stored, so the preconditioner may change
/// from one application to the next. When a [`SearchDirections`] memory is supplied, every
/// `(z_j, A z_j)` pair is recorded, and a zero initial guess is first replaced by the
/// projection of `b` onto the remembered span (followed by one true residual evaluation).
#[instrument(skip(x, b, operator, preconditioner, memory, reporter), name = "fgmres")]
pub fn fgmres<V, A, P>(
    x: &mut V,
    b: &V,
    operator: &mut A,
    preconditioner: &mut P,
    options: FgmresOptions,
    mut memory: Option<&mut SearchDirections<V>>,
    reporter: &ProgressReporter,
) -> Result<KrylovOutcome, EngineError>
where
    V: VectorSpace,
    A: LinearOperator<V>,
    P: LinearOperator<V>,
{
    let FgmresOptions {
        max_iterations,
        tolerance,
        restart,
    } = options;

    if b.norm() == 0.0 {
        x.zero();
        debug!("FGMRES: zero right-hand side, returning the zero solution.");
        return Ok(KrylovOutcome::converged_immediately());
    }
    let zero_guess = x.norm() == 0.0;
    let mut r = super::initial_residual(x, b, operator)?;
    let rnorm0 = r.norm();
    if rnorm0 == 0.0 {
        debug!("FGMRES: initial guess already solves the system.");
        return Ok(KrylovOutcome::converged_immediately());
    }
    if zero_guess {
        if let Some(x0) = memory.as_deref().and_then(|m| m.warm_start(b)) {
            *x = x0;
            r = super::residual(x, b, operator)?;
        }
    }

    let basis = restart.unwrap_or(max_iterations).clamp(1, max_iterations.max(1));
    let mut beta = r.norm();
    let mut reduction = beta / rnorm0;
    let mut total = 0;

    reporter.report(Progress::TaskStart {
        total_steps: max_iterations as u64,
    });

    while total < max_iterations && reduction >= tolerance {
        let mut v0 = r.clone();
        v0.scale(1.0 / beta);
        let mut vs: Vec<V> = vec![v0];
        let mut zs: Vec<V> = Vec::with_capacity(basis);
        let mut h = DMatrix::<f64>::zeros(basis + 1, basis);
        let mut cs = vec![0.0; basis];
        let mut sn = vec![0.0; basis];
        let mut g = DVector::<f64>::zeros(basis + 1);
        g[0] = beta;

        let mut k = 0;
        let mut breakdown = false;
        while k < basis && total < max_iterations {
            let z = preconditioner.multiply(&vs[k])?;
            let mut w = operator.multiply(&z)?;
            if let Some(memory) = memory.as_deref_mut() {
                memory.record(&z, &w);
            }

            for (i, v) in vs.iter().enumerate() {
                let hik = w.dot(v);
                h[(i, k)] = hik;
                w.axpy(-hik, v);
            }
            let hnext = w.norm();
            h[(k + 1, k)] = hnext;

            for i in 0..k {
                let (a, bb) = (h[(i, k)], h[(i + 1, k)]);
                h[(i, k)] = cs[i] * a + sn[i] * bb;
                h[(i + 1, k)] = -sn[i] * a + cs[i] * bb;
            }
            let (c, s) = givens(h[(k, k)], h[(k + 1, k)]);
            cs[k] = c;
            sn[k] = s;
            h[(k, k)] = c * h[(k, k)] + s * h[(k + 1, k)];
            h[(k + 1, k)] = 0.0;
            g[k + 1] = -s * g[k];
            g[k] *= c;

            zs.push(z);
            k += 1;
            total += 1;
            reduction = g[k].abs() / rnorm0;
            debug!("FGMRES iteration {}: residual reduction = {:.6e}", total, reduction);
            reporter.report(Progress::Residual {
                iteration: total,
                reduction,
            });
            reporter.report(Progress::TaskIncrement);

            if hnext == 0.0 {
                debug!("FGMRES: breakdown at iteration {}.", total);
                breakdown = true;
                break;
            }
            if reduction < tolerance {
                break;
            }
            w.scale(1.0 / hnext);
            vs.push(w);
        }

        let triangle = h.view((0, 0), (k, k)).into_owned();
        let y = triangle
            .solve_upper_triangular(&g.rows(0, k).into_owned())
            .ok_or_else(|| {
                EngineError::Internal("FGMRES Hessenberg factor is singular".to_string())
            })?;
        for (z, yj) in zs.iter().zip(y.iter()) {
            x.axpy(*yj, z);
        }

        if breakdown || reduction < tolerance || total >= max_iterations {
            break;
        }
        debug!("FGMRES: restarting after {} iteration(s).", total);
        r = super::residual(x, b, operator)?;
        beta = r.norm();
        reduction = beta / rnorm0;
    }

    reporter.report(Progress::TaskFinish);
    info!(
        "FGMRES: {} iteration(s), residual norm reduction = {:.6e}",
        total, reduction
    );
    Ok(KrylovOutcome {
        reduction,
        iterations: total,
    })
}
