use crate::core::space::VectorSpace;
use crate::engine::config::{ConfigError, EnsembleConfig, MemberDescriptor};
use crate::engine::error::{BoxError, EngineError};
use crate::engine::interfaces::LinearVariableChange;
use std::fmt;
use std::ops::Index;
use tracing::{debug, info, instrument};

/// A full model state as seen by the ensemble builder.
pub trait ModelState: Clone {
    type Increment: VectorSpace;
    type Geometry;
    type Time: Clone + PartialEq + fmt::Display;

    fn valid_time(&self) -> &Self::Time;

    fn interpolate_to(&self, geometry: &Self::Geometry) -> Result<Self, BoxError>;

    /// `self - other` as an increment.
    fn diff(&self, other: &Self) -> Self::Increment;

    /// `self += weight * other`.
    fn accumulate(&mut self, weight: f64, other: &Self);

    /// Same state layout and valid time, every field set to zero.
    fn zeroed(&self) -> Self;
}

/// Reads ensemble members on a target geometry.
pub trait MemberSource<S: ModelState> {
    fn read_member(
        &self,
        descriptor: &MemberDescriptor,
        geometry: &S::Geometry,
    ) -> Result<S, BoxError>;
}

fn check_time<S: ModelState>(expected: &S::Time, state: &S) -> Result<(), EngineError> {
    if state.valid_time() != expected {
        return Err(EngineError::ValidTimeMismatch {
            expected: expected.to_string(),
            found: state.valid_time().to_string(),
        });
    }
    Ok(())
}

/// All members of an ensemble, loaded on one geometry at one valid time.
#[derive(Debug, Clone)]
pub struct StateEnsemble<S> {
    members: Vec<S>,
}

impl<S: ModelState> StateEnsemble<S> {
    #[instrument(skip_all, fields(members = config.members))]
    pub fn load(
        valid_time: &S::Time,
        config: &EnsembleConfig,
        geometry: &S::Geometry,
        source: &dyn MemberSource<S>,
    ) -> Result<Self, EngineError> {
        let mut members = Vec::with_capacity(config.members);
        for descriptor in &config.sources {
            let member = source
                .read_member(descriptor, geometry)
                .map_err(|e| EngineError::Member {
                    member: descriptor.name.clone(),
                    source: e,
                })?;
            check_time(valid_time, &member)?;
            debug!("Loaded ensemble member '{}'.", descriptor.name);
            members.push(member);
        }
        Ok(Self { members })
    }

    pub fn from_members(members: Vec<S>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.members.iter()
    }

    /// Equal-weight mean of the members. `None` for an empty ensemble.
    pub fn mean(&self) -> Option<S> {
        let first = self.members.first()?;
        let weight = 1.0 / self.members.len() as f64;
        let mut mean = first.zeroed();
        for member in &self.members {
            mean.accumulate(weight, member);
        }
        Some(mean)
    }
}

impl<S> Index<usize> for StateEnsemble<S> {
    type Output = S;

    fn index(&self, index: usize) -> &S {
        &self.members[index]
    }
}

/// Ensemble perturbations used to sample flow-dependent background covariances.
pub struct Ensemble<S: ModelState> {
    valid_time: S::Time,
    config: EnsembleConfig,
    perturbations: Vec<S::Increment>,
}

impl<S: ModelState> Ensemble<S> {
    pub fn new(valid_time: S::Time, config: EnsembleConfig) -> Self {
        Self {
            valid_time,
            config,
            perturbations: Vec::new(),
        }
    }

    pub fn valid_time(&self) -> &S::Time {
        &self.valid_time
    }

    pub fn len(&self) -> usize {
        self.perturbations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.perturbations.is_empty()
    }

    pub fn perturbations(&self) -> &[S::Increment] {
        &self.perturbations
    }

    fn rescale(&self) -> f64 {
        1.0 / ((self.config.members as f64) - 1.0).sqrt()
    }

    fn load_members(
        &self,
        xb: &S,
        geometry: &S::Geometry,
        source: &dyn MemberSource<S>,
    ) -> Result<(S, StateEnsemble<S>), EngineError> {
        if self.config.members < 2 {
            return Err(ConfigError::InsufficientMembers(
                self.config.members,
            )
            .into());
        }
        check_time(&self.valid_time, xb)?;
        let xb = xb
            .interpolate_to(geometry)
            .map_err(|e| EngineError::term("background", e))?;
        let members = StateEnsemble::load(&self.valid_time, &self.config, geometry, source)?;
        if members.len() != self.config.members {
            return Err(ConfigError::MemberCountMismatch {
                expected: self.config.members,
                found: members.len(),
            }
            .into());
        }
        Ok((xb, members))
    }

    /// Perturbations about the ensemble mean, built from `member - xb` and re-centred.
    ///
    /// Each perturbation is `(member - xb + (xb - mean)) / √(R-1)`. Replaces any previous
    /// perturbation set.
    #[instrument(skip_all, name = "ensemble_linearize")]
    pub fn linearize(
        &mut self,
        xb: &S,
        geometry: &S::Geometry,
        source: &dyn MemberSource<S>,
    ) -> Result<(), EngineError> {
        let (xb, members) = self.load_members(xb, geometry, source)?;
        let r = self.config.members as f64;

        let mut bgmean = xb.clone();
        for member in members.iter() {
            bgmean.accumulate(-1.0 / r, member);
        }
        let offset = bgmean.diff(&xb.zeroed());

        let rk = self.rescale();
        self.perturbations = members
            .iter()
            .map(|member| {
                let mut dx = member.diff(&xb);
                dx.axpy(1.0, &offset);
                dx.scale(rk);
                dx
            })
            .collect();
        info!(
            "Linearized ensemble of {} members about the ensemble mean.",
            self.perturbations.len()
        );
        Ok(())
    }

    /// Perturbations about the ensemble mean passed through the inverse balance operator.
    #[instrument(skip_all, name = "ensemble_linearize_balanced")]
    pub fn linearize_balanced(
        &mut self,
        xb: &S,
        geometry: &S::Geometry,
        source: &dyn MemberSource<S>,
        balance: &dyn LinearVariableChange<S::Increment>,
    ) -> Result<(), EngineError> {
        let (_, members) = self.load_members(xb, geometry, source)?;
        let mean = members
            .mean()
            .ok_or_else(|| EngineError::Internal("ensemble has no members".to_string()))?;

        let rk = self.rescale();
        let mut perturbations = Vec::with_capacity(members.len());
        for member in members.iter() {
            let dx = member.diff(&mean);
            let mut dx = balance
                .multiply_inverse(&dx)
                .map_err(|e| EngineError::term(balance.name(), e))?;
            dx.scale(rk);
            perturbations.push(dx);
        }
        self.perturbations = perturbations;
        info!(
            "Linearized ensemble of {} members through '{}'.",
            self.perturbations.len(),
            balance.name()
        );
        Ok(())
    }
}

impl<S: ModelState> Index<usize> for Ensemble<S> {
    type Output = S::Increment;

    fn index(&self, index: usize) -> &S::Increment {
        &self.perturbations[index]
    }
}
