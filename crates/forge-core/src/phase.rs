//! Orchestration phases and their legal transitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Plan,
    EnsureArtifact,
    Execute,
    Validate,
    Retry,
    Terminate,
}

impl Phase {
    /// Stable lowercase name, used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::EnsureArtifact => "ensure_artifact",
            Self::Execute => "execute",
            Self::Validate => "validate",
            Self::Retry => "retry",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal phase change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase transition: {from} -> {to}")]
pub struct PhaseError {
    pub from: Phase,
    pub to: Phase,
}

/// Validates a phase transition.
///
/// # Errors
/// Returns [`PhaseError`] if `to` is not reachable from `from`
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), PhaseError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PhaseError { from, to })
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: Phase) -> &'static [Phase] {
    use Phase::*;
    match from {
        Plan => &[EnsureArtifact],
        EnsureArtifact => &[Execute],
        Execute => &[Validate],
        Validate => &[Retry, Terminate],
        Retry => &[EnsureArtifact],
        Terminate => &[],
    }
}
