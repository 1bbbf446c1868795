use crate::core::control::ControlIncrement;
use crate::engine::error::BoxError;
use crate::engine::interfaces::ModelRunner;
use crate::engine::observers::{AdjointObservers, TangentLinearObservers};
use nalgebra::DVector;

/// Periodic upwind advection on a 1-D grid.
///
/// One step maps `x_i ← a x_i + (1 - a) x_{i-1}` with cyclic indexing; the window holds
/// `steps` steps, so observers are invoked at steps `0..=steps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToyModel {
    advection: f64,
    steps: usize,
}

impl ToyModel {
    pub fn new(advection: f64, steps: usize) -> Self {
        Self { advection, steps }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn step(&self, x: &mut DVector<f64>) {
        let n = x.len();
        if n == 0 {
            return;
        }
        let old = x.clone();
        for i in 0..n {
            let upwind = old[(i + n - 1) % n];
            x[i] = self.advection * old[i] + (1.0 - self.advection) * upwind;
        }
    }

    pub fn step_adjoint(&self, x: &mut DVector<f64>) {
        let n = x.len();
        if n == 0 {
            return;
        }
        let old = x.clone();
        for i in 0..n {
            let downwind = old[(i + 1) % n];
            x[i] = self.advection * old[i] + (1.0 - self.advection) * downwind;
        }
    }

    /// Full trajectory of a state over the window, one entry per step.
    pub fn trajectory(&self, x0: &DVector<f64>) -> Vec<DVector<f64>> {
        let mut states = Vec::with_capacity(self.steps + 1);
        let mut x = x0.clone();
        states.push(x.clone());
        for _ in 0..self.steps {
            self.step(&mut x);
            states.push(x.clone());
        }
        states
    }
}

impl ModelRunner<DVector<f64>, DVector<f64>> for ToyModel {
    fn run_tlm(
        &self,
        dx: &mut ControlIncrement<DVector<f64>>,
        observers: &mut TangentLinearObservers<'_, DVector<f64>, DVector<f64>>,
    ) -> Result<(), BoxError> {
        observers.initialize(dx)?;
        for step in 0..=self.steps {
            if step > 0 {
                self.step(dx.state_mut());
            }
            observers.process(dx, step)?;
        }
        observers.finalize(dx)
    }

    fn run_adj(
        &self,
        dx: &mut ControlIncrement<DVector<f64>>,
        observers: &mut AdjointObservers<'_, DVector<f64>>,
    ) -> Result<(), BoxError> {
        observers.initialize(dx)?;
        for step in (0..=self.steps).rev() {
            observers.process(dx, step)?;
            if step > 0 {
                self.step_adjoint(dx.state_mut());
            }
        }
        observers.finalize(dx)
    }
}

/// Runner whose integrations always fail, counting how often it was asked to run.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct DivergingModel {
    calls: std::rc::Rc<std::cell::Cell<usize>>,
}

#[cfg(test)]
#[derive(Debug, thiserror::Error)]
#[error("toy integration diverged")]
pub(crate) struct Diverged;

#[cfg(test)]
impl DivergingModel {
    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    fn fail(&self) -> Result<(), BoxError> {
        self.calls.set(self.calls.get() + 1);
        Err(Box::new(Diverged))
    }
}

#[cfg(test)]
impl ModelRunner<DVector<f64>, DVector<f64>> for DivergingModel {
    fn run_tlm(
        &self,
        _dx: &mut ControlIncrement<DVector<f64>>,
        _observers: &mut TangentLinearObservers<'_, DVector<f64>, DVector<f64>>,
    ) -> Result<(), BoxError> {
        self.fail()
    }

    fn run_adj(
        &self,
        _dx: &mut ControlIncrement<DVector<f64>>,
        _observers: &mut AdjointObservers<'_, DVector<f64>>,
    ) -> Result<(), BoxError> {
        self.fail()
    }
}
