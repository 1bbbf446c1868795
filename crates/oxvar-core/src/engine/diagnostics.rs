//! Adjoint self-consistency harness.
//!
//! Every check draws random vectors with [`VectorSpace::random`] and compares two
//! evaluations that must agree in exact arithmetic. Checks return reports rather than
//! failing, so callers decide how strict to be.

use crate::core::control::ControlIncrement;
use crate::core::space::VectorSpace;
use crate::engine::config::DiagnosticsConfig;
use crate::engine::cost::{BACKGROUND_TERM, CostFunction};
use crate::engine::error::EngineError;
use crate::engine::interfaces::LinearVariableChange;
use crate::engine::operators::LinearOperator;
use std::fmt;
use tracing::{info, instrument, warn};

/// Outcome of comparing `<x, A y>` against `<Aᵗ x, y>` (or an equivalent pair).
#[derive(Debug, Clone, PartialEq)]
pub struct AdjointTestReport {
    pub label: String,
    pub forward: f64,
    pub backward: f64,
}

impl AdjointTestReport {
    pub fn new(label: impl Into<String>, forward: f64, backward: f64) -> Self {
        Self {
            label: label.into(),
            forward,
            backward,
        }
    }

    /// `|forward - backward| / |forward|`, or 0 when both vanish.
    pub fn relative_mismatch(&self) -> f64 {
        let mismatch = (self.forward - self.backward).abs();
        if self.forward == 0.0 {
            if mismatch == 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            mismatch / self.forward.abs()
        }
    }

    pub fn passes(&self, tolerance: f64) -> bool {
        self.relative_mismatch() < tolerance
    }
}

impl fmt::Display for AdjointTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Adjoint test {}: forward = {:.16e}, backward = {:.16e}, relative mismatch = {:.4e}",
            self.label,
            self.forward,
            self.backward,
            self.relative_mismatch()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualKind {
    /// The operator applied to a zero vector must give exactly zero.
    Zero,
    /// `‖K⁻¹ K x - x‖ / ‖x‖`.
    Inverse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResidualCheckReport {
    pub label: String,
    pub kind: ResidualKind,
    pub residual: f64,
}

impl ResidualCheckReport {
    pub fn passes(&self, tolerance: f64) -> bool {
        match self.kind {
            ResidualKind::Zero => self.residual == 0.0,
            ResidualKind::Inverse => self.residual < tolerance,
        }
    }
}

impl fmt::Display for ResidualCheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ResidualKind::Zero => "zero test norm",
            ResidualKind::Inverse => "inverse test relative error",
        };
        write!(f, "{} {}: {:.4e}", self.label, what, self.residual)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    Adjoint(AdjointTestReport),
    Residual(ResidualCheckReport),
}

impl Check {
    pub fn passes(&self, config: &DiagnosticsConfig) -> bool {
        match self {
            Check::Adjoint(r) => r.passes(config.adjoint_tolerance),
            Check::Residual(r) => r.passes(config.inverse_tolerance),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Check::Adjoint(r) => &r.label,
            Check::Residual(r) => &r.label,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Adjoint(r) => r.fmt(f),
            Check::Residual(r) => r.fmt(f),
        }
    }
}

fn random_like<V: VectorSpace>(template: &V) -> V {
    let mut v = template.clone();
    v.random();
    v
}

/// Compares `<x, A y>` with `<A x, y>` for random `x`, `y` shaped like `template`.
#[instrument(skip(operator, template))]
pub fn check_operator_symmetry<V, A>(
    label: &str,
    operator: &mut A,
    template: &V,
) -> Result<AdjointTestReport, EngineError>
where
    V: VectorSpace,
    A: LinearOperator<V>,
{
    let x = random_like(template);
    let y = random_like(template);
    let ay = operator.multiply(&y)?;
    let ax = operator.multiply(&x)?;
    Ok(AdjointTestReport::new(label, x.dot(&ay), ax.dot(&y)))
}

/// Compares `<H dx, dy>` with `<dx, Hᵗ dy>` for the composed observation operator.
#[instrument(skip_all)]
pub fn check_tangent_linear_adjoint<I: VectorSpace, D: VectorSpace>(
    cost: &CostFunction<I, D>,
) -> Result<AdjointTestReport, EngineError> {
    let dx = random_like(&cost.new_increment());
    let mut dy = cost.new_dual();
    dy.random();

    let hdx = cost.linearized_departures(&dx)?;
    let htdy = cost.adjoint_departures(&dy)?;
    let forward: f64 = hdx.iter().zip(dy.iter()).map(|(a, b)| a.dot(b)).sum();
    Ok(AdjointTestReport::new("H/Hᵗ", forward, dx.dot(&htdy)))
}

/// Zero, symmetry and inverse checks for every covariance in the cost function.
#[instrument(skip_all)]
pub fn check_covariances<I: VectorSpace, D: VectorSpace>(
    cost: &CostFunction<I, D>,
) -> Result<Vec<Check>, EngineError> {
    let mut checks = Vec::new();
    let background = cost.background();
    let bterm = |e| EngineError::term(BACKGROUND_TERM, e);

    let zero = cost.new_increment();
    checks.push(zero_check(
        "B",
        background.multiply_b(&zero).map_err(bterm)?.norm(),
    ));
    checks.push(zero_check(
        "B⁻¹",
        background.multiply_binv(&zero).map_err(bterm)?.norm(),
    ));
    let x = random_like(&zero);
    let y = random_like(&zero);
    let by = background.multiply_b(&y).map_err(bterm)?;
    let bx = background.multiply_b(&x).map_err(bterm)?;
    checks.push(Check::Adjoint(AdjointTestReport::new(
        "B",
        x.dot(&by),
        bx.dot(&y),
    )));
    let round_trip = background.multiply_binv(&bx).map_err(bterm)?;
    checks.push(inverse_check("B", &x, &round_trip));

    for term in cost.terms() {
        let tterm = |e| EngineError::term(term.name(), e);
        let zero = term.new_dual_vector();
        checks.push(zero_check(
            format!("R ({})", term.name()),
            term.multiply_covar(&zero).map_err(tterm)?.norm(),
        ));
        checks.push(zero_check(
            format!("R⁻¹ ({})", term.name()),
            term.multiply_co_inv(&zero).map_err(tterm)?.norm(),
        ));
        let x = random_like(&zero);
        let y = random_like(&zero);
        let ry = term.multiply_covar(&y).map_err(tterm)?;
        let rx = term.multiply_covar(&x).map_err(tterm)?;
        checks.push(Check::Adjoint(AdjointTestReport::new(
            format!("R ({})", term.name()),
            x.dot(&ry),
            rx.dot(&y),
        )));
        let round_trip = term.multiply_co_inv(&rx).map_err(tterm)?;
        checks.push(inverse_check(format!("R ({})", term.name()), &x, &round_trip));
    }
    Ok(checks)
}

/// Zero, adjoint and (optionally) inverse checks for a linear change of variables.
#[instrument(skip_all, fields(name = change.name()))]
pub fn check_variable_change<I: VectorSpace>(
    change: &dyn LinearVariableChange<I>,
    template: &I,
    config: &DiagnosticsConfig,
) -> Result<Vec<Check>, EngineError> {
    let name = change.name();
    let wrap = |e| EngineError::term(name, e);
    let mut checks = Vec::new();

    let zero = template.zeroed();
    checks.push(zero_check(
        format!("{} K", name),
        change.multiply(&zero).map_err(wrap)?.norm(),
    ));
    checks.push(zero_check(
        format!("{} Kᵗ", name),
        change.multiply_ad(&zero).map_err(wrap)?.norm(),
    ));
    checks.push(zero_check(
        format!("{} K⁻¹", name),
        change.multiply_inverse(&zero).map_err(wrap)?.norm(),
    ));
    checks.push(zero_check(
        format!("{} K⁻ᵗ", name),
        change.multiply_inverse_ad(&zero).map_err(wrap)?.norm(),
    ));

    let x1 = random_like(template);
    let x2 = random_like(template);
    let kx1 = change.multiply(&x1).map_err(wrap)?;
    let ktx2 = change.multiply_ad(&x2).map_err(wrap)?;
    checks.push(Check::Adjoint(AdjointTestReport::new(
        format!("{} K", name),
        x2.dot(&kx1),
        ktx2.dot(&x1),
    )));
    let kinv_x1 = change.multiply_inverse(&x1).map_err(wrap)?;
    let kinvt_x2 = change.multiply_inverse_ad(&x2).map_err(wrap)?;
    checks.push(Check::Adjoint(AdjointTestReport::new(
        format!("{} K⁻¹", name),
        x2.dot(&kinv_x1),
        kinvt_x2.dot(&x1),
    )));

    if config.test_inverse {
        let back = change.multiply_inverse(&kx1).map_err(wrap)?;
        checks.push(inverse_check(format!("{} K", name), &x1, &back));
        let back_ad = change.multiply_inverse_ad(&ktx2).map_err(wrap)?;
        checks.push(inverse_check(format!("{} Kᵗ", name), &x2, &back_ad));
    }
    Ok(checks)
}

fn zero_check(label: impl Into<String>, norm: f64) -> Check {
    Check::Residual(ResidualCheckReport {
        label: label.into(),
        kind: ResidualKind::Zero,
        residual: norm,
    })
}

fn inverse_check<V: VectorSpace>(label: impl Into<String>, original: &V, round_trip: &V) -> Check {
    let mut diff = round_trip.clone();
    diff.axpy(-1.0, original);
    let scale = original.norm();
    let residual = if scale == 0.0 { diff.norm() } else { diff.norm() / scale };
    Check::Residual(ResidualCheckReport {
        label: label.into(),
        kind: ResidualKind::Inverse,
        residual,
    })
}

/// Logs every check and returns how many exceeded their tolerance.
pub fn log_checks(checks: &[Check], config: &DiagnosticsConfig) -> usize {
    let mut failures = 0;
    for check in checks {
        if check.passes(config) {
            info!("{}", check);
        } else {
            warn!("{} exceeds tolerance", check);
            failures += 1;
        }
    }
    failures
}

/// Template helper for callers that only hold a cost function.
pub fn state_template<I: VectorSpace, D: VectorSpace>(cost: &CostFunction<I, D>) -> I {
    ControlIncrement::into_state(cost.new_increment())
}
