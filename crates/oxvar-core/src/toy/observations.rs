use super::ToyError;
use crate::core::control::ControlIncrement;
use crate::engine::error::BoxError;
use crate::engine::interfaces::CostTerm;
use crate::engine::observers::{
    AdjointObserver, BoxedAdjointObserver, BoxedTangentLinearObserver, TangentLinearObserver,
};
use nalgebra::DVector;
use serde::Deserialize;

/// One observed grid point at one step of the window.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObsPoint {
    pub step: usize,
    pub index: usize,
    pub value: f64,
}

/// Point observations with a single error variance and an optional scalar bias.
///
/// When `bias_slot` is set, the observation operator adds the bias coefficient held in
/// that auxiliary slot of the control increment to every point.
#[derive(Debug, Clone)]
pub struct PointObservations {
    name: String,
    size: usize,
    points: Vec<ObsPoint>,
    variance: f64,
    departures: DVector<f64>,
    bias_slot: Option<usize>,
}

impl PointObservations {
    /// `departures` holds `H(xk) - y` along the first-guess trajectory, one entry per point.
    /// Every point must index into a grid of `size` points.
    pub fn new(
        name: impl Into<String>,
        size: usize,
        points: Vec<ObsPoint>,
        variance: f64,
        departures: DVector<f64>,
        bias_slot: Option<usize>,
    ) -> Result<Self, ToyError> {
        let name = name.into();
        if let Some(point) = points.iter().find(|p| p.index >= size) {
            return Err(ToyError::PointOutOfRange {
                term: name,
                index: point.index,
                size,
            });
        }
        super::check_len(points.len(), departures.len())?;
        Ok(Self {
            name,
            size,
            points,
            variance,
            departures,
            bias_slot,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn bias(dx: &ControlIncrement<DVector<f64>>, slot: Option<usize>) -> Result<f64, ToyError> {
    match slot {
        None => Ok(0.0),
        Some(slot) => dx
            .aux(slot)
            .and_then(|aux| aux.get(0).copied())
            .ok_or(ToyError::MissingBiasSlot(slot)),
    }
}

struct PointTangentLinear<'a> {
    size: usize,
    points: &'a [ObsPoint],
    bias_slot: Option<usize>,
    values: DVector<f64>,
    output: Option<DVector<f64>>,
}

impl TangentLinearObserver<DVector<f64>, DVector<f64>> for PointTangentLinear<'_> {
    fn process(
        &mut self,
        dx: &ControlIncrement<DVector<f64>>,
        step: usize,
    ) -> Result<(), BoxError> {
        super::check_len(self.size, dx.state().len())?;
        let bias = bias(dx, self.bias_slot)?;
        for (k, point) in self.points.iter().enumerate() {
            if point.step == step {
                self.values[k] = dx.state()[point.index] + bias;
            }
        }
        Ok(())
    }

    fn finalize(&mut self, _dx: &ControlIncrement<DVector<f64>>) -> Result<(), BoxError> {
        self.output = Some(self.values.clone());
        Ok(())
    }

    fn release_output(&mut self) -> Option<DVector<f64>> {
        self.output.take()
    }
}

struct PointAdjoint<'a> {
    size: usize,
    points: &'a [ObsPoint],
    bias_slot: Option<usize>,
    forcing: DVector<f64>,
}

impl AdjointObserver<DVector<f64>> for PointAdjoint<'_> {
    fn initialize(&mut self, dx: &mut ControlIncrement<DVector<f64>>) -> Result<(), BoxError> {
        if let Some(slot) = self.bias_slot {
            let aux = dx.aux_mut(slot).ok_or(ToyError::MissingBiasSlot(slot))?;
            if aux.is_empty() {
                return Err(ToyError::MissingBiasSlot(slot).into());
            }
            aux[0] += self.forcing.sum();
        }
        Ok(())
    }

    fn process(
        &mut self,
        dx: &mut ControlIncrement<DVector<f64>>,
        step: usize,
    ) -> Result<(), BoxError> {
        super::check_len(self.size, dx.state().len())?;
        let state = dx.state_mut();
        for (k, point) in self.points.iter().enumerate() {
            if point.step == step {
                state[point.index] += self.forcing[k];
            }
        }
        Ok(())
    }
}

impl CostTerm<DVector<f64>, DVector<f64>> for PointObservations {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup_tl(
        &self,
        _dx: &ControlIncrement<DVector<f64>>,
    ) -> BoxedTangentLinearObserver<'_, DVector<f64>, DVector<f64>> {
        Box::new(PointTangentLinear {
            size: self.size,
            points: &self.points,
            bias_slot: self.bias_slot,
            values: DVector::zeros(self.points.len()),
            output: None,
        })
    }

    fn setup_ad(&self, forcing: DVector<f64>) -> BoxedAdjointObserver<'_, DVector<f64>> {
        Box::new(PointAdjoint {
            size: self.size,
            points: &self.points,
            bias_slot: self.bias_slot,
            forcing,
        })
    }

    fn multiply_co_inv(&self, dy: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        super::check_len(self.points.len(), dy.len())?;
        Ok(dy / self.variance)
    }

    fn multiply_covar(&self, dy: &DVector<f64>) -> Result<DVector<f64>, BoxError> {
        super::check_len(self.points.len(), dy.len())?;
        Ok(dy * self.variance)
    }

    fn new_dual_vector(&self) -> DVector<f64> {
        DVector::zeros(self.points.len())
    }

    fn new_gradient_fg(&self) -> DVector<f64> {
        &self.departures / self.variance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(bias_slot: Option<usize>) -> PointObservations {
        PointObservations::new(
            "Points",
            2,
            vec![
                ObsPoint {
                    step: 0,
                    index: 1,
                    value: 0.0,
                },
                ObsPoint {
                    step: 1,
                    index: 0,
                    value: 0.0,
                },
            ],
            0.5,
            DVector::from_vec(vec![1.0, -1.0]),
            bias_slot,
        )
        .unwrap()
    }

    #[test]
    fn tangent_linear_samples_points_at_their_step() {
        let obs = term(Some(0));
        let mut hook = obs.setup_tl(&ControlIncrement::new(DVector::zeros(2)));
        let mut dx = ControlIncrement::with_aux(
            DVector::from_vec(vec![1.0, 2.0]),
            vec![DVector::from_vec(vec![0.5])],
        );
        hook.process(&dx, 0).unwrap();
        dx.state_mut()[0] = 10.0;
        hook.process(&dx, 1).unwrap();
        hook.finalize(&dx).unwrap();
        assert_eq!(hook.release_output().unwrap(), DVector::from_vec(vec![2.5, 10.5]));
        assert!(hook.release_output().is_none());
    }

    #[test]
    fn adjoint_forcing_lands_on_points_and_bias() {
        let obs = term(Some(0));
        let mut hook = obs.setup_ad(DVector::from_vec(vec![3.0, 4.0]));
        let mut dx = ControlIncrement::with_aux(DVector::zeros(2), vec![DVector::zeros(1)]);
        hook.initialize(&mut dx).unwrap();
        hook.process(&mut dx, 1).unwrap();
        hook.process(&mut dx, 0).unwrap();
        assert_eq!(dx.state(), &DVector::from_vec(vec![4.0, 3.0]));
        assert_eq!(dx.aux(0).unwrap()[0], 7.0);
    }

    #[test]
    fn missing_bias_slot_is_a_term_error() {
        let obs = term(Some(2));
        let mut hook = obs.setup_tl(&ControlIncrement::new(DVector::zeros(2)));
        let err = hook
            .process(&ControlIncrement::new(DVector::zeros(2)), 0)
            .unwrap_err();
        assert!(err.to_string().contains("auxiliary slot 2"));
    }

    #[test]
    fn covariances_are_scalar() {
        let obs = term(None);
        let dy = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(obs.multiply_covar(&dy).unwrap(), DVector::from_vec(vec![0.5, 1.0]));
        assert_eq!(obs.multiply_co_inv(&dy).unwrap(), DVector::from_vec(vec![2.0, 4.0]));
        assert_eq!(obs.new_gradient_fg(), DVector::from_vec(vec![2.0, -2.0]));
        assert!(obs.multiply_covar(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn points_off_the_grid_are_rejected_up_front() {
        let point = ObsPoint {
            step: 0,
            index: 3,
            value: 1.0,
        };
        let err = PointObservations::new("Far", 3, vec![point], 1.0, DVector::zeros(1), None)
            .unwrap_err();
        assert!(matches!(
            err,
            ToyError::PointOutOfRange { ref term, index: 3, size: 3 } if term == "Far"
        ));
    }

    #[test]
    fn departures_must_match_points() {
        let err = PointObservations::new("Short", 2, Vec::new(), 1.0, DVector::zeros(1), None)
            .unwrap_err();
        assert!(matches!(err, ToyError::Dimension { expected: 0, found: 1 }));
    }

    #[test]
    fn hooks_reject_a_state_of_the_wrong_size() {
        let obs = term(None);
        let mut tl = obs.setup_tl(&ControlIncrement::new(DVector::zeros(2)));
        assert!(tl.process(&ControlIncrement::new(DVector::zeros(1)), 0).is_err());

        let mut ad = obs.setup_ad(DVector::from_vec(vec![1.0, 1.0]));
        let mut dx = ControlIncrement::new(DVector::zeros(1));
        assert!(ad.process(&mut dx, 0).is_err());
    }
}
