use super::{ToyError, check_len};
use crate::core::control::ControlIncrement;
use crate::core::space::VectorSpace;
use crate::engine::error::BoxError;
use crate::engine::interfaces::BackgroundTerm;
use nalgebra::DVector;

/// Background term with diagonal `B` over the state and every auxiliary slot.
#[derive(Debug, Clone)]
pub struct ToyBackground {
    variances: DVector<f64>,
    aux_variances: Vec<DVector<f64>>,
    first_guess: ControlIncrement<DVector<f64>>,
}

impl ToyBackground {
    /// Auxiliary slots of `first_guess` get unit variances until
    /// [`with_aux_variances`](Self::with_aux_variances) says otherwise.
    pub fn new(variances: DVector<f64>, first_guess: ControlIncrement<DVector<f64>>) -> Self {
        let aux_variances = (0..first_guess.n_aux())
            .filter_map(|slot| first_guess.aux(slot))
            .map(|aux| DVector::from_element(aux.len(), 1.0))
            .collect();
        Self {
            variances,
            aux_variances,
            first_guess,
        }
    }

    pub fn with_aux_variances(mut self, aux_variances: Vec<DVector<f64>>) -> Self {
        self.aux_variances = aux_variances;
        self
    }

    fn apply(
        &self,
        dx: &ControlIncrement<DVector<f64>>,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<ControlIncrement<DVector<f64>>, ToyError> {
        check_len(self.variances.len(), dx.state().len())?;
        check_len(self.aux_variances.len(), dx.n_aux())?;
        let state = dx.state().zip_map(&self.variances, &op);
        let mut aux = Vec::with_capacity(dx.n_aux());
        for (slot, variances) in self.aux_variances.iter().enumerate() {
            let values = dx.aux(slot).ok_or(ToyError::MissingBiasSlot(slot))?;
            check_len(variances.len(), values.len())?;
            aux.push(values.zip_map(variances, &op));
        }
        Ok(ControlIncrement::with_aux(state, aux))
    }
}

impl BackgroundTerm<DVector<f64>> for ToyBackground {
    fn multiply_binv(
        &self,
        dx: &ControlIncrement<DVector<f64>>,
    ) -> Result<ControlIncrement<DVector<f64>>, BoxError> {
        Ok(self.apply(dx, |x, v| x / v)?)
    }

    fn multiply_b(
        &self,
        dx: &ControlIncrement<DVector<f64>>,
    ) -> Result<ControlIncrement<DVector<f64>>, BoxError> {
        Ok(self.apply(dx, |x, v| x * v)?)
    }

    fn first_guess(&self) -> ControlIncrement<DVector<f64>> {
        self.first_guess.clone()
    }

    fn new_increment(&self) -> ControlIncrement<DVector<f64>> {
        self.first_guess.zeroed()
    }
}
