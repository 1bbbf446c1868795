use super::background::ToyBackground;
use super::model::ToyModel;
use super::observations::{ObsPoint, PointObservations};
use super::{ToyError, check_len};
use crate::core::control::ControlIncrement;
use crate::engine::cost::CostFunction;
use crate::engine::interfaces::{CostTerm, ModelRunner};
use nalgebra::DVector;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BackgroundSpec {
    pub values: Vec<f64>,
    pub variances: Vec<f64>,
    /// Outer-loop state `xk`; defaults to the background itself.
    pub first_guess: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ObservationSpec {
    pub name: String,
    pub variance: f64,
    /// Enables a scalar bias control variable with this background variance.
    pub bias_variance: Option<f64>,
    pub points: Vec<ObsPoint>,
}

/// TOML description of a toy assimilation problem.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToyProblemSpec {
    pub size: usize,
    pub steps: usize,
    pub advection: f64,
    pub background: BackgroundSpec,
    #[serde(default)]
    pub observations: Vec<ObservationSpec>,
}

impl ToyProblemSpec {
    pub fn parse(text: &str) -> Result<Self, ToyError> {
        Ok(toml::from_str(text)?)
    }
}

fn invalid(message: impl Into<String>) -> ToyError {
    ToyError::InvalidSpec(message.into())
}

/// A validated toy problem, ready to hand out cost functions.
#[derive(Debug, Clone)]
pub struct ToyProblem {
    model: ToyModel,
    xb: DVector<f64>,
    xk: DVector<f64>,
    background: ToyBackground,
    terms: Vec<PointObservations>,
}

impl ToyProblem {
    pub fn from_spec(spec: &ToyProblemSpec) -> Result<Self, ToyError> {
        let n = spec.size;
        if n == 0 {
            return Err(invalid("size must be positive"));
        }
        check_len(n, spec.background.values.len())?;
        check_len(n, spec.background.variances.len())?;
        if spec.background.variances.iter().any(|v| !(*v > 0.0)) {
            return Err(invalid("background variances must be positive"));
        }

        let model = ToyModel::new(spec.advection, spec.steps);
        let xb = DVector::from_vec(spec.background.values.clone());
        let xk = match &spec.background.first_guess {
            Some(values) => {
                check_len(n, values.len())?;
                DVector::from_vec(values.clone())
            }
            None => xb.clone(),
        };
        let trajectory = model.trajectory(&xk);

        let mut terms = Vec::with_capacity(spec.observations.len());
        let mut aux_variances = Vec::new();
        for obs in &spec.observations {
            if !(obs.variance > 0.0) {
                return Err(invalid(format!(
                    "observation '{}' needs a positive variance",
                    obs.name
                )));
            }
            for point in &obs.points {
                if point.index >= n || point.step > spec.steps {
                    return Err(invalid(format!(
                        "observation '{}' has an out-of-range point (step {}, index {})",
                        obs.name, point.step, point.index
                    )));
                }
            }
            let bias_slot = match obs.bias_variance {
                Some(v) if v > 0.0 => {
                    aux_variances.push(DVector::from_element(1, v));
                    Some(aux_variances.len() - 1)
                }
                Some(_) => {
                    return Err(invalid(format!(
                        "observation '{}' needs a positive bias variance",
                        obs.name
                    )));
                }
                None => None,
            };
            let departures = DVector::from_iterator(
                obs.points.len(),
                obs.points
                    .iter()
                    .map(|p| trajectory[p.step][p.index] - p.value),
            );
            terms.push(PointObservations::new(
                obs.name.clone(),
                n,
                obs.points.clone(),
                obs.variance,
                departures,
                bias_slot,
            )?);
        }

        let first_guess = ControlIncrement::with_aux(
            &xk - &xb,
            aux_variances.iter().map(|_| DVector::zeros(1)).collect(),
        );
        let variances = DVector::from_vec(spec.background.variances.clone());
        let background =
            ToyBackground::new(variances, first_guess).with_aux_variances(aux_variances);

        debug!(
            "Toy problem: {} grid points, {} step(s), {} observation term(s).",
            n,
            spec.steps,
            terms.len()
        );
        Ok(Self {
            model,
            xb,
            xk,
            background,
            terms,
        })
    }

    pub fn size(&self) -> usize {
        self.xb.len()
    }

    pub fn background_state(&self) -> &DVector<f64> {
        &self.xb
    }

    pub fn first_guess_state(&self) -> &DVector<f64> {
        &self.xk
    }

    pub fn term_names(&self) -> Vec<&str> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    /// Assembles a fresh cost function owning copies of the problem's collaborators.
    pub fn cost_function(&self) -> CostFunction<DVector<f64>, DVector<f64>> {
        self.cost_function_with_runner(Box::new(self.model))
    }

    /// Same as [`Self::cost_function`], with integrations delegated to `runner`.
    pub fn cost_function_with_runner(
        &self,
        runner: Box<dyn ModelRunner<DVector<f64>, DVector<f64>>>,
    ) -> CostFunction<DVector<f64>, DVector<f64>> {
        let terms: Vec<Box<dyn CostTerm<DVector<f64>, DVector<f64>>>> = self
            .terms
            .iter()
            .cloned()
            .map(|t| Box::new(t) as Box<dyn CostTerm<DVector<f64>, DVector<f64>>>)
            .collect();
        CostFunction::new(Box::new(self.background.clone()), terms, runner)
    }

    /// `xk + dx`, the analysis state for a solved increment.
    pub fn analysis(
        &self,
        increment: &ControlIncrement<DVector<f64>>,
    ) -> Result<DVector<f64>, ToyError> {
        check_len(self.size(), increment.state().len())?;
        Ok(&self.xk + increment.state())
    }
}
