use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Ensemble declares {expected} members but {found} member sources were given")]
    MemberCountMismatch { expected: usize, found: usize },

    #[error("An ensemble needs at least 2 members, got {0}")]
    InsufficientMembers(usize),

    #[error("Ensemble member '{0}' is declared more than once")]
    DuplicateMember(String),
}

pub const DEFAULT_GRADIENT_NORM_REDUCTION: f64 = 1e-10;
pub const DEFAULT_ADJOINT_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_INVERSE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinimizerKind {
    /// Saddle-point formulation solved with GMRESR.
    #[default]
    SaddlePoint,
    /// Primal Hessian system solved with flexible GMRES.
    Fgmres,
}

impl MinimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            MinimizerKind::SaddlePoint => "SaddlePointMinimizer",
            MinimizerKind::Fgmres => "FgmresMinimizer",
        }
    }
}

/// Preconditioner applied by the primal (Hessian) minimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preconditioner {
    #[default]
    Identity,
    /// Background-error covariance B, which is the inverse of the Hessian's leading term.
    Background,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerConfig {
    pub algorithm: MinimizerKind,
    pub max_iterations: usize,
    pub gradient_norm_reduction: f64,
    pub online_adjoint_test: bool,
    pub preconditioner: Preconditioner,
    /// Restart length for FGMRES; `None` keeps the full Krylov basis.
    pub restart: Option<usize>,
    /// Number of (z, Az) pairs kept between successive FGMRES solves. 0 disables recycling.
    pub recycled_directions: usize,
}

#[derive(Default)]
pub struct MinimizerConfigBuilder {
    algorithm: Option<MinimizerKind>,
    max_iterations: Option<usize>,
    gradient_norm_reduction: Option<f64>,
    online_adjoint_test: Option<bool>,
    preconditioner: Option<Preconditioner>,
    restart: Option<usize>,
    recycled_directions: Option<usize>,
}

impl MinimizerConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm(mut self, kind: MinimizerKind) -> Self {
        self.algorithm = Some(kind);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn gradient_norm_reduction(mut self, reduction: f64) -> Self {
        self.gradient_norm_reduction = Some(reduction);
        self
    }
    pub fn online_adjoint_test(mut self, enabled: bool) -> Self {
        self.online_adjoint_test = Some(enabled);
        self
    }
    pub fn preconditioner(mut self, preconditioner: Preconditioner) -> Self {
        self.preconditioner = Some(preconditioner);
        self
    }
    pub fn restart(mut self, length: usize) -> Self {
        self.restart = Some(length);
        self
    }
    pub fn recycled_directions(mut self, count: usize) -> Self {
        self.recycled_directions = Some(count);
        self
    }

    pub fn build(self) -> Result<MinimizerConfig, ConfigError> {
        let max_iterations = self
            .max_iterations
            .ok_or(ConfigError::MissingParameter("max_iterations"))?;
        if max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        let gradient_norm_reduction = self
            .gradient_norm_reduction
            .unwrap_or(DEFAULT_GRADIENT_NORM_REDUCTION);
        if !(gradient_norm_reduction > 0.0 && gradient_norm_reduction < 1.0) {
            return Err(ConfigError::InvalidParameter {
                name: "gradient_norm_reduction",
                reason: format!("{} is not in (0, 1)", gradient_norm_reduction),
            });
        }
        if self.restart == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "restart",
                reason: "restart length must be positive".to_string(),
            });
        }
        Ok(MinimizerConfig {
            algorithm: self.algorithm.unwrap_or_default(),
            max_iterations,
            gradient_norm_reduction,
            online_adjoint_test: self.online_adjoint_test.unwrap_or(false),
            preconditioner: self.preconditioner.unwrap_or_default(),
            restart: self.restart,
            recycled_directions: self.recycled_directions.unwrap_or(0),
        })
    }
}

/// Where one ensemble member comes from. The `source` string is opaque to the engine and
/// interpreted by the `MemberSource` collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleConfig {
    pub members: usize,
    pub sources: Vec<MemberDescriptor>,
}

#[derive(Default)]
pub struct EnsembleConfigBuilder {
    members: Option<usize>,
    sources: Vec<MemberDescriptor>,
}

impl EnsembleConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(mut self, count: usize) -> Self {
        self.members = Some(count);
        self
    }
    pub fn member(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.sources.push(MemberDescriptor {
            name: name.into(),
            source: source.into(),
        });
        self
    }
    pub fn sources(mut self, sources: Vec<MemberDescriptor>) -> Self {
        self.sources = sources;
        self
    }

    pub fn build(self) -> Result<EnsembleConfig, ConfigError> {
        let members = self
            .members
            .ok_or(ConfigError::MissingParameter("members"))?;
        if members < 2 {
            return Err(ConfigError::InsufficientMembers(members));
        }
        if self.sources.len() != members {
            return Err(ConfigError::MemberCountMismatch {
                expected: members,
                found: self.sources.len(),
            });
        }
        let mut seen = HashSet::with_capacity(members);
        if let Some(dup) = self.sources.iter().find(|d| !seen.insert(d.name.as_str())) {
            return Err(ConfigError::DuplicateMember(dup.name.clone()));
        }
        Ok(EnsembleConfig {
            members,
            sources: self.sources,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub adjoint_tolerance: f64,
    pub test_inverse: bool,
    pub inverse_tolerance: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            adjoint_tolerance: DEFAULT_ADJOINT_TOLERANCE,
            test_inverse: false,
            inverse_tolerance: DEFAULT_INVERSE_TOLERANCE,
        }
    }
}

#[derive(Default)]
pub struct DiagnosticsConfigBuilder {
    adjoint_tolerance: Option<f64>,
    test_inverse: Option<bool>,
    inverse_tolerance: Option<f64>,
}

impl DiagnosticsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adjoint_tolerance(mut self, tolerance: f64) -> Self {
        self.adjoint_tolerance = Some(tolerance);
        self
    }
    pub fn test_inverse(mut self, enabled: bool) -> Self {
        self.test_inverse = Some(enabled);
        self
    }
    pub fn inverse_tolerance(mut self, tolerance: f64) -> Self {
        self.inverse_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<DiagnosticsConfig, ConfigError> {
        let defaults = DiagnosticsConfig::default();
        let adjoint_tolerance = self.adjoint_tolerance.unwrap_or(defaults.adjoint_tolerance);
        let inverse_tolerance = self.inverse_tolerance.unwrap_or(defaults.inverse_tolerance);
        for (name, value) in [
            ("adjoint_tolerance", adjoint_tolerance),
            ("inverse_tolerance", inverse_tolerance),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("tolerance must be positive, got {}", value),
                });
            }
        }
        Ok(DiagnosticsConfig {
            adjoint_tolerance,
            test_inverse: self.test_inverse.unwrap_or(defaults.test_inverse),
            inverse_tolerance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimizer_builder_applies_defaults() {
        let config = MinimizerConfigBuilder::new()
            .max_iterations(25)
            .build()
            .unwrap();
        assert_eq!(config.algorithm, MinimizerKind::SaddlePoint);
        assert_eq!(config.gradient_norm_reduction, 1e-10);
        assert_eq!(config.preconditioner, Preconditioner::Identity);
        assert_eq!(config.restart, None);
        assert_eq!(config.recycled_directions, 0);
        assert!(!config.online_adjoint_test);
    }

    #[test]
    fn minimizer_builder_requires_iteration_cap() {
        let err = MinimizerConfigBuilder::new().build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("max_iterations"));
    }

    #[test]
    fn minimizer_builder_rejects_reduction_outside_unit_interval() {
        let err = MinimizerConfigBuilder::new()
            .max_iterations(10)
            .gradient_norm_reduction(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "gradient_norm_reduction",
                ..
            }
        ));
    }

    #[test]
    fn minimizer_builder_rejects_zero_restart() {
        let err = MinimizerConfigBuilder::new()
            .max_iterations(10)
            .restart(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "restart", .. }));
    }

    #[test]
    fn ensemble_builder_checks_member_count() {
        let err = EnsembleConfigBuilder::new()
            .members(3)
            .member("m1", "a")
            .member("m2", "b")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MemberCountMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn ensemble_builder_requires_two_members() {
        let err = EnsembleConfigBuilder::new()
            .members(1)
            .member("m1", "a")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::InsufficientMembers(1));
    }

    #[test]
    fn ensemble_builder_rejects_duplicate_member_names() {
        let err = EnsembleConfigBuilder::new()
            .members(3)
            .member("m1", "a")
            .member("m2", "b")
            .member("m1", "c")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateMember("m1".to_string()));
    }

    #[test]
    fn ensemble_builder_accepts_matching_sources() {
        let config = EnsembleConfigBuilder::new()
            .members(2)
            .member("m1", "a")
            .member("m2", "b")
            .build()
            .unwrap();
        assert_eq!(config.sources[1].source, "b");
    }

    #[test]
    fn diagnostics_defaults_are_tight() {
        let config = DiagnosticsConfigBuilder::new().build().unwrap();
        assert_eq!(config, DiagnosticsConfig::default());
        assert_eq!(config.adjoint_tolerance, 1e-10);
        assert!(!config.test_inverse);
    }

    #[test]
    fn diagnostics_rejects_non_positive_tolerance() {
        let err = DiagnosticsConfigBuilder::new()
            .adjoint_tolerance(0.0)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "adjoint_tolerance",
                ..
            }
        ));
    }
}
