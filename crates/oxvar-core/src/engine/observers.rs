use crate::core::control::ControlIncrement;
use crate::engine::error::{BoxError, EngineError};

/// A hook invoked by the model runner during a tangent-linear integration.
///
/// The observer sees the evolving increment at every step and accumulates its own output
/// (typically `H dx` for one cost term). The output is handed over once through
/// [`release_output`](TangentLinearObserver::release_output).
pub trait TangentLinearObserver<I, O> {
    fn initialize(&mut self, _dx: &ControlIncrement<I>) -> Result<(), BoxError> {
        Ok(())
    }

    fn process(&mut self, dx: &ControlIncrement<I>, step: usize) -> Result<(), BoxError>;

    fn finalize(&mut self, _dx: &ControlIncrement<I>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Takes the accumulated output. Returns `None` once the output has been taken.
    fn release_output(&mut self) -> Option<O>;
}

/// A hook invoked by the model runner during an adjoint integration.
///
/// Forcing is added directly into the adjoint accumulator `dx` the runner passes in.
pub trait AdjointObserver<I> {
    fn initialize(&mut self, _dx: &mut ControlIncrement<I>) -> Result<(), BoxError> {
        Ok(())
    }

    fn process(&mut self, dx: &mut ControlIncrement<I>, step: usize) -> Result<(), BoxError>;

    fn finalize(&mut self, _dx: &mut ControlIncrement<I>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Extra control-space contribution gathered outside the accumulator, if any.
    fn release_contribution(&mut self) -> Option<ControlIncrement<I>> {
        None
    }
}

pub type BoxedTangentLinearObserver<'a, I, O> = Box<dyn TangentLinearObserver<I, O> + 'a>;
pub type BoxedAdjointObserver<'a, I> = Box<dyn AdjointObserver<I> + 'a>;

/// The ordered hook list enrolled for one tangent-linear run.
///
/// Term hooks sit at the same positions as the cost function's terms. The optional
/// background hook is kept apart since its output lives in control space.
pub struct TangentLinearObservers<'a, I, D> {
    background: Option<BoxedTangentLinearObserver<'a, I, ControlIncrement<I>>>,
    terms: Vec<BoxedTangentLinearObserver<'a, I, D>>,
}

impl<'a, I, D> Default for TangentLinearObservers<'a, I, D> {
    fn default() -> Self {
        Self {
            background: None,
            terms: Vec::new(),
        }
    }
}

impl<'a, I, D> TangentLinearObservers<'a, I, D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_background(
        &mut self,
        observer: BoxedTangentLinearObserver<'a, I, ControlIncrement<I>>,
    ) {
        self.background = Some(observer);
    }

    /// Enrolls a term hook and returns its position.
    pub fn push(&mut self, observer: BoxedTangentLinearObserver<'a, I, D>) -> usize {
        self.terms.push(observer);
        self.terms.len() - 1
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.background.is_none()
    }

    fn each(&mut self) -> impl Iterator<Item = &mut (dyn TangentLinearObserver<I, D> + 'a)> {
        self.terms.iter_mut().map(|o| o.as_mut())
    }

    pub fn initialize(&mut self, dx: &ControlIncrement<I>) -> Result<(), BoxError> {
        if let Some(bg) = &mut self.background {
            bg.initialize(dx)?;
        }
        self.each().try_for_each(|o| o.initialize(dx))
    }

    pub fn process(&mut self, dx: &ControlIncrement<I>, step: usize) -> Result<(), BoxError> {
        if let Some(bg) = &mut self.background {
            bg.process(dx, step)?;
        }
        self.each().try_for_each(|o| o.process(dx, step))
    }

    pub fn finalize(&mut self, dx: &ControlIncrement<I>) -> Result<(), BoxError> {
        if let Some(bg) = &mut self.background {
            bg.finalize(dx)?;
        }
        self.each().try_for_each(|o| o.finalize(dx))
    }

    pub fn release_output(&mut self, index: usize) -> Result<D, EngineError> {
        let observer = self.terms.get_mut(index).ok_or_else(|| {
            EngineError::Internal(format!("no tangent-linear observer at position {}", index))
        })?;
        observer
            .release_output()
            .ok_or(EngineError::ObserverReleased { index })
    }

    pub fn release_background(&mut self) -> Option<ControlIncrement<I>> {
        self.background.as_mut().and_then(|bg| bg.release_output())
    }
}

/// The ordered hook list enrolled for one adjoint run.
pub struct AdjointObservers<'a, I> {
    background: Option<BoxedAdjointObserver<'a, I>>,
    terms: Vec<BoxedAdjointObserver<'a, I>>,
}

impl<'a, I> Default for AdjointObservers<'a, I> {
    fn default() -> Self {
        Self {
            background: None,
            terms: Vec::new(),
        }
    }
}

impl<'a, I> AdjointObservers<'a, I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_background(&mut self, observer: BoxedAdjointObserver<'a, I>) {
        self.background = Some(observer);
    }

    pub fn push(&mut self, observer: BoxedAdjointObserver<'a, I>) -> usize {
        self.terms.push(observer);
        self.terms.len() - 1
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.background.is_none()
    }

    fn all(&mut self) -> impl Iterator<Item = &mut (dyn AdjointObserver<I> + 'a)> {
        self.background
            .iter_mut()
            .chain(self.terms.iter_mut())
            .map(|o| o.as_mut())
    }

    pub fn initialize(&mut self, dx: &mut ControlIncrement<I>) -> Result<(), BoxError> {
        self.all().try_for_each(|o| o.initialize(dx))
    }

    pub fn process(&mut self, dx: &mut ControlIncrement<I>, step: usize) -> Result<(), BoxError> {
        self.all().try_for_each(|o| o.process(dx, step))
    }

    pub fn finalize(&mut self, dx: &mut ControlIncrement<I>) -> Result<(), BoxError> {
        self.all().try_for_each(|o| o.finalize(dx))
    }

    pub fn release_background(&mut self) -> Option<ControlIncrement<I>> {
        self.background
            .as_mut()
            .and_then(|bg| bg.release_contribution())
    }
}
