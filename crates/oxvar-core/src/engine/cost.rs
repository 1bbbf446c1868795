use crate::core::control::ControlIncrement;
use crate::core::dual::DualVector;
use crate::core::space::VectorSpace;
use crate::engine::error::EngineError;
use crate::engine::interfaces::{BackgroundTerm, CostTerm, ModelRunner};
use crate::engine::observers::{AdjointObservers, TangentLinearObservers};
use tracing::{debug, instrument};

/// Name under which background-term failures are reported.
pub const BACKGROUND_TERM: &str = "Jb";

/// The incremental cost function: a background term, an ordered list of observation or
/// constraint terms, and the model runner that drives linearized integrations.
///
/// The term list is fixed at construction; dual vectors built from this cost function are
/// positionally aligned with it.
pub struct CostFunction<I: VectorSpace, D: VectorSpace> {
    background: Box<dyn BackgroundTerm<I>>,
    terms: Vec<Box<dyn CostTerm<I, D>>>,
    runner: Box<dyn ModelRunner<I, D>>,
}

impl<I: VectorSpace, D: VectorSpace> CostFunction<I, D> {
    pub fn new(
        background: Box<dyn BackgroundTerm<I>>,
        terms: Vec<Box<dyn CostTerm<I, D>>>,
        runner: Box<dyn ModelRunner<I, D>>,
    ) -> Self {
        debug!("Assembled cost function with {} term(s).", terms.len());
        Self {
            background,
            terms,
            runner,
        }
    }

    pub fn background(&self) -> &dyn BackgroundTerm<I> {
        self.background.as_ref()
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn term(&self, index: usize) -> Option<&dyn CostTerm<I, D>> {
        self.terms.get(index).map(|t| t.as_ref())
    }

    pub fn terms(&self) -> impl Iterator<Item = &dyn CostTerm<I, D>> {
        self.terms.iter().map(|t| t.as_ref())
    }

    pub fn new_increment(&self) -> ControlIncrement<I> {
        self.background.new_increment()
    }

    /// A dual vector with a zero background slot and one fresh entry per term.
    pub fn new_dual(&self) -> DualVector<I, D> {
        let mut dual = DualVector::with_dx(self.new_increment());
        for term in &self.terms {
            dual.append(term.new_dual_vector());
        }
        dual
    }

    pub fn run_tlm(
        &self,
        dx: &mut ControlIncrement<I>,
        observers: &mut TangentLinearObservers<'_, I, D>,
    ) -> Result<(), EngineError> {
        self.runner
            .run_tlm(dx, observers)
            .map_err(EngineError::Integration)
    }

    pub fn run_adj(
        &self,
        dx: &mut ControlIncrement<I>,
        observers: &mut AdjointObservers<'_, I>,
    ) -> Result<(), EngineError> {
        self.runner
            .run_adj(dx, observers)
            .map_err(EngineError::Integration)
    }

    /// Applies the composed linearized observation operator: one entry `H_j dx` per term.
    #[instrument(skip_all, name = "apply_h")]
    pub fn linearized_departures(
        &self,
        dx: &ControlIncrement<I>,
    ) -> Result<DualVector<I, D>, EngineError> {
        let mut observers = TangentLinearObservers::new();
        for term in &self.terms {
            observers.push(term.setup_tl(dx));
        }
        let mut ww = dx.clone();
        self.run_tlm(&mut ww, &mut observers)?;

        let mut out = DualVector::new();
        for j in 0..self.terms.len() {
            out.append(observers.release_output(j)?);
        }
        Ok(out)
    }

    /// Applies the adjoint of the composed observation operator to one forcing per term.
    #[instrument(skip_all, name = "apply_ht")]
    pub fn adjoint_departures(
        &self,
        forcing: &DualVector<I, D>,
    ) -> Result<ControlIncrement<I>, EngineError> {
        self.check_dual(forcing)?;
        let mut observers = AdjointObservers::new();
        for (term, dy) in self.terms.iter().zip(forcing.iter()) {
            observers.push(term.setup_ad(dy.clone()));
        }
        let mut dx = self.new_increment();
        self.run_adj(&mut dx, &mut observers)?;
        Ok(dx)
    }

    /// Gradient of the cost function at the first guess: `B⁻¹ fg + Σ Hᵗ gradFG_j`.
    #[instrument(skip_all, name = "gradient_fg")]
    pub fn compute_gradient_fg(&self) -> Result<ControlIncrement<I>, EngineError> {
        let mut grad_fgs = DualVector::new();
        for term in &self.terms {
            grad_fgs.append(term.new_gradient_fg());
        }
        let mut grad = self.adjoint_departures(&grad_fgs)?;
        let jb = self
            .background
            .multiply_binv(&self.background.first_guess())
            .map_err(|e| EngineError::term(BACKGROUND_TERM, e))?;
        grad += &jb;
        debug!("First-guess gradient norm = {:.6e}", grad.norm());
        Ok(grad)
    }

    pub(crate) fn check_dual(&self, dual: &DualVector<I, D>) -> Result<(), EngineError> {
        if dual.len() != self.terms.len() {
            return Err(EngineError::Structure(format!(
                "dual vector has {} entries but the cost function has {} terms",
                dual.len(),
                self.terms.len()
            )));
        }
        Ok(())
    }
}
