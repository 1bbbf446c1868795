use super::config::ConfigError;
use thiserror::Error;

/// Error type surfaced by external collaborators (model runners, terms, balance operators).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model integration failed: {0}")]
    Integration(#[source] BoxError),

    #[error("Cost term '{term}' failed: {source}")]
    Term {
        term: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to read ensemble member '{member}': {source}")]
    Member {
        member: String,
        #[source]
        source: BoxError,
    },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Valid time mismatch: expected {expected}, found {found}")]
    ValidTimeMismatch { expected: String, found: String },

    #[error("Output of observer {index} was already released")]
    ObserverReleased { index: usize },

    #[error("Structure mismatch: {0}")]
    Structure(String),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub(crate) fn term(term: impl Into<String>, source: BoxError) -> Self {
        Self::Term {
            term: term.into(),
            source,
        }
    }
}
