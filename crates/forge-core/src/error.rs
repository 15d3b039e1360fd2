//! Error types for the orchestrator
//!
//! Generation, validation, execution and mismatch failures never surface
//! here: they are absorbed by the fallback stub or drive the retry loop.
//! [`ForgeError`] covers what aborts a run outright.

use forge_artifact::{StoreError, TargetError};
use forge_runtime::{ReferenceError, RegistrationError, RegistryError};

use crate::config::ConfigError;
use crate::phase::PhaseError;

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Persisting or reading an artifact failed
    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),

    /// Binding an artifact failed
    #[error("registration failure: {0}")]
    Registration(#[from] RegistrationError),

    /// A bound artifact disappeared
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid target identifier
    #[error("invalid target: {0}")]
    Target(#[from] TargetError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reference table could not be loaded
    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    /// Orchestrator reached an illegal phase transition
    #[error("internal error: {0}")]
    Phase(#[from] PhaseError),

    /// The overall run deadline elapsed
    #[error("run timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },
}

impl ForgeError {
    /// Whether the error stems from user input rather than the environment
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Target(_) | Self::Config(_) | Self::Reference(_)
        )
    }

    /// Short category name for logs
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Store(_) => "persistence",
            Self::Registration(_) | Self::Registry(_) => "registration",
            Self::Target(_) | Self::Config(_) | Self::Reference(_) => "input",
            Self::Phase(_) => "internal",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let err: ForgeError = TargetError::Empty.into();
        assert!(err.is_input_error());
        assert_eq!(err.category(), "input");

        let timeout = ForgeError::Timeout { duration_secs: 5 };
        assert!(!timeout.is_input_error());
        assert_eq!(timeout.to_string(), "run timed out after 5s");
    }
}
