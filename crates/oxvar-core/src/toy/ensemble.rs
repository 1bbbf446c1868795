use super::{ToyError, check_len};
use crate::engine::config::{EnsembleConfig, EnsembleConfigBuilder, MemberDescriptor};
use crate::engine::ensemble::{Ensemble, MemberSource, ModelState};
use crate::engine::error::{BoxError, EngineError};
use crate::engine::interfaces::LinearVariableChange;
use nalgebra::DVector;
use serde::Deserialize;
use std::collections::HashMap;
use toml::value::Datetime;

/// A periodic 1-D grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToyGeometry {
    size: usize,
}

impl ToyGeometry {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToyState {
    time: Datetime,
    values: DVector<f64>,
}

impl ToyState {
    pub fn new(time: Datetime, values: DVector<f64>) -> Self {
        Self { time, values }
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn time(&self) -> &Datetime {
        &self.time
    }
}

impl ModelState for ToyState {
    type Increment = DVector<f64>;
    type Geometry = ToyGeometry;
    type Time = Datetime;

    fn valid_time(&self) -> &Datetime {
        &self.time
    }

    /// Periodic linear interpolation onto the target grid.
    fn interpolate_to(&self, geometry: &ToyGeometry) -> Result<Self, BoxError> {
        let source = self.values.len();
        let target = geometry.size();
        if source == target {
            return Ok(self.clone());
        }
        if source == 0 || target == 0 {
            return Err(ToyError::InvalidSpec(format!(
                "cannot interpolate a {source}-point state onto {target} points"
            ))
            .into());
        }
        let ratio = source as f64 / target as f64;
        let values = DVector::from_fn(target, |i, _| {
            let position = i as f64 * ratio;
            let left = position.floor() as usize % source;
            let weight = position - position.floor();
            (1.0 - weight) * self.values[left] + weight * self.values[(left + 1) % source]
        });
        Ok(Self::new(self.time, values))
    }

    fn diff(&self, other: &Self) -> DVector<f64> {
        &self.values - &other.values
    }

    fn accumulate(&mut self, weight: f64, other: &Self) {
        self.values.axpy(weight, &other.values, 1.0);
    }

    fn zeroed(&self) -> Self {
        Self::new(self.time, DVector::zeros(self.values.len()))
    }
}

/// Member states keyed by their source string.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMembers {
    states: HashMap<String, ToyState>,
}

impl InMemoryMembers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: String, state: ToyState) {
        self.states.insert(source, state);
    }
}

impl MemberSource<ToyState> for InMemoryMembers {
    fn read_member(
        &self,
        descriptor: &MemberDescriptor,
        geometry: &ToyGeometry,
    ) -> Result<ToyState, BoxError> {
        let state = self
            .states
            .get(&descriptor.source)
            .ok_or_else(|| ToyError::UnknownMember(descriptor.source.clone()))?;
        state.interpolate_to(geometry)
    }
}

/// Lower-bidiagonal balance `y_i = x_i + c x_{i-1}` (non-periodic, so always invertible).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToyBalance {
    coupling: f64,
}

impl ToyBalance {
    pub fn new(coupling: f64) -> Self {
        Self { coupling }
    }
}

impl LinearVariableChange<DVector<f64>> for ToyBalance {
    fn name(&self) -> &str {
        "ToyBalance"
    }

    fn multiply(&self, dx: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        let mut y = dx.clone();
        for i in 1..dx.len() {
            y[i] += self.coupling * dx[i - 1];
        }
        Ok(y)
    }

    fn multiply_ad(&self, dx: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        let mut y = dx.clone();
        for i in 0..dx.len().saturating_sub(1) {
            y[i] += self.coupling * dx[i + 1];
        }
        Ok(y)
    }

    fn multiply_inverse(&self, dx: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        let mut x = dx.clone();
        for i in 1..x.len() {
            x[i] -= self.coupling * x[i - 1];
        }
        Ok(x)
    }

    fn multiply_inverse_ad(&self, dx: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        let mut x = dx.clone();
        for i in (0..x.len().saturating_sub(1)).rev() {
            x[i] -= self.coupling * x[i + 1];
        }
        Ok(x)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MemberSpec {
    pub name: String,
    pub values: Vec<f64>,
    /// Defaults to the ensemble's valid time.
    pub valid_time: Option<Datetime>,
}

/// TOML description of a toy ensemble.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToyEnsembleSpec {
    pub valid_time: Datetime,
    pub size: usize,
    pub background: Vec<f64>,
    /// Switches to the balanced linearization when present.
    pub coupling: Option<f64>,
    pub members: Vec<MemberSpec>,
}

impl ToyEnsembleSpec {
    pub fn parse(text: &str) -> Result<Self, ToyError> {
        Ok(toml::from_str(text)?)
    }
}

/// Everything needed to linearize a toy ensemble.
#[derive(Debug, Clone)]
pub struct ToyEnsemble {
    pub valid_time: Datetime,
    pub config: EnsembleConfig,
    pub background: ToyState,
    pub members: InMemoryMembers,
    pub geometry: ToyGeometry,
    pub balance: Option<ToyBalance>,
}

impl ToyEnsemble {
    pub fn from_spec(spec: &ToyEnsembleSpec) -> Result<Self, ToyError> {
        if spec.size == 0 {
            return Err(ToyError::InvalidSpec("size must be positive".to_string()));
        }
        check_len(spec.size, spec.background.len())?;

        let mut builder = EnsembleConfigBuilder::new().members(spec.members.len());
        let mut members = InMemoryMembers::new();
        for member in &spec.members {
            if member.values.is_empty() {
                return Err(ToyError::InvalidSpec(format!(
                    "member '{}' has no values",
                    member.name
                )));
            }
            builder = builder.member(member.name.clone(), member.name.clone());
            members.insert(
                member.name.clone(),
                ToyState::new(
                    member.valid_time.unwrap_or(spec.valid_time),
                    DVector::from_vec(member.values.clone()),
                ),
            );
        }

        Ok(Self {
            valid_time: spec.valid_time,
            config: builder.build()?,
            background: ToyState::new(spec.valid_time, DVector::from_vec(spec.background.clone())),
            members,
            geometry: ToyGeometry::new(spec.size),
            balance: spec.coupling.map(ToyBalance::new),
        })
    }

    /// Builds the perturbations, through the balance operator when one is configured.
    pub fn linearize(&self) -> Result<Ensemble<ToyState>, EngineError> {
        let mut ensemble = Ensemble::new(self.valid_time, self.config.clone());
        match &self.balance {
            Some(balance) => ensemble.linearize_balanced(
                &self.background,
                &self.geometry,
                &self.members,
                balance,
            )?,
            None => ensemble.linearize(&self.background, &self.geometry, &self.members)?,
        }
        Ok(ensemble)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::space::VectorSpace;
    use crate::engine::config::ConfigError;

    fn time(text: &str) -> Datetime {
        text.parse().unwrap()
    }

    #[test]
    fn interpolation_is_periodic_and_linear() {
        let state = ToyState::new(
            time("2020-01-01T00:00:00Z"),
            DVector::from_vec(vec![0.0, 2.0]),
        );
        let fine = state.interpolate_to(&ToyGeometry::new(4)).unwrap();
        assert_eq!(fine.values(), &DVector::from_vec(vec![0.0, 1.0, 2.0, 1.0]));
        assert_eq!(fine.valid_time(), state.valid_time());
        let same = state.interpolate_to(&ToyGeometry::new(2)).unwrap();
        assert_eq!(same, state);
        assert!(state.interpolate_to(&ToyGeometry::new(0)).is_err());
    }

    #[test]
    fn accumulate_and_diff_act_on_values() {
        let t = time("2020-01-01T00:00:00Z");
        let mut a = ToyState::new(t, DVector::from_vec(vec![1.0, 1.0]));
        let b = ToyState::new(t, DVector::from_vec(vec![2.0, -2.0]));
        a.accumulate(0.5, &b);
        assert_eq!(a.values(), &DVector::from_vec(vec![2.0, 0.0]));
        assert_eq!(a.diff(&b), DVector::from_vec(vec![0.0, 2.0]));
        assert_eq!(a.zeroed().values(), &DVector::zeros(2));
    }

    #[test]
    fn balance_inverse_and_adjoint_are_exact() {
        let balance = ToyBalance::new(0.7);
        let mut x = DVector::zeros(5);
        let mut y = DVector::zeros(5);
        VectorSpace::random(&mut x);
        VectorSpace::random(&mut y);

        let bx = balance.multiply(&x).unwrap();
        assert!((balance.multiply_inverse(&bx).unwrap() - &x).norm() < 1e-12);
        let bty = balance.multiply_ad(&y).unwrap();
        assert!((bx.dot(&y) - x.dot(&bty)).abs() < 1e-12);
        assert!((balance.multiply_inverse_ad(&bty).unwrap() - &y).norm() < 1e-12);
    }

    #[test]
    fn unknown_member_source_is_reported() {
        let err = InMemoryMembers::new()
            .read_member(
                &MemberDescriptor {
                    name: "mem001".to_string(),
                    source: "missing".to_string(),
                },
                &ToyGeometry::new(2),
            )
            .unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

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

    #[test]
    fn spec_builds_and_linearizes() {
        let spec = ToyEnsembleSpec::parse(ENSEMBLE).unwrap();
        let ensemble = ToyEnsemble::from_spec(&spec).unwrap();
        assert_eq!(ensemble.config.members, 2);
        assert!(ensemble.balance.is_none());

        let linearized = ensemble.linearize().unwrap();
        assert_eq!(linearized.len(), 2);
        assert_eq!(linearized[0], DVector::from_vec(vec![-1.0, 1.0]));
        assert_eq!(linearized[1], DVector::from_vec(vec![1.0, -1.0]));
    }

    #[test]
    fn member_time_override_fails_linearization() {
        let text = ENSEMBLE.replace(
            "values = [3.0, 1.0]",
            "values = [3.0, 1.0]\nvalid-time = 2020-01-01T06:00:00Z",
        );
        let ensemble = ToyEnsemble::from_spec(&ToyEnsembleSpec::parse(&text).unwrap()).unwrap();
        assert!(matches!(
            ensemble.linearize(),
            Err(EngineError::ValidTimeMismatch { .. })
        ));
    }

    #[test]
    fn single_member_is_rejected() {
        let text = r#"
            valid-time = 2020-01-01T00:00:00Z
            size = 2
            background = [0.0, 0.0]

            [[members]]
            name = "mem001"
            values = [1.0, 3.0]
        "#;
        let spec = ToyEnsembleSpec::parse(text).unwrap();
        assert!(matches!(
            ToyEnsemble::from_spec(&spec),
            Err(ToyError::Config(_))
        ));
    }

    #[test]
    fn duplicate_member_names_are_rejected() {
        let text = ENSEMBLE.replace("name = \"mem002\"", "name = \"mem001\"");
        let spec = ToyEnsembleSpec::parse(&text).unwrap();
        assert!(matches!(
            ToyEnsemble::from_spec(&spec),
            Err(ToyError::Config(ConfigError::DuplicateMember(name))) if name == "mem001"
        ));
    }
}
