//! Per-run attempt state and the retry decision

use std::fmt;

use forge_artifact::Target;
use forge_runtime::ArtifactOrigin;
use serde::{Deserialize, Serialize};

/// What went wrong in an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// The generator returned no candidate
    Generation,
    /// The candidate failed static validation
    Validation,
    /// The artifact failed while running
    Execution,
    /// The output differed from the reference
    Mismatch,
    /// The fallback stub ran; its placeholder output never passes
    Stub,
}

impl DiagnosticKind {
    /// Stable lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Mismatch => "mismatch",
            Self::Stub => "stub",
        }
    }

    /// Whether the diagnostic says something about the artifact's code
    #[must_use]
    pub fn concerns_code(self) -> bool {
        matches!(self, Self::Validation | Self::Execution | Self::Mismatch)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 0-based attempt the failure belongs to
    pub attempt: u32,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt {} [{}]: {}", self.attempt + 1, self.kind, self.message)
    }
}

/// Verdict of the most recent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    Passed,
    Failed,
}

/// Retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run another attempt with this 0-based index
    Retry { next_attempt: u32 },
    /// Stop
    Terminate,
}

/// Mutable state of one run, dropped when the run terminates
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub target: Target,
    /// 0-based index of the current attempt
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_outcome: Option<AttemptVerdict>,
    pub diagnostics: Vec<Diagnostic>,
    /// Origin of the artifact executed in the current attempt
    pub artifact_origin: Option<ArtifactOrigin>,
}

impl AttemptState {
    /// Fresh state at attempt 0
    #[must_use]
    pub fn new(target: Target, max_attempts: u32) -> Self {
        Self {
            target,
            attempt: 0,
            max_attempts,
            last_outcome: None,
            diagnostics: Vec::new(),
            artifact_origin: None,
        }
    }

    /// Record a diagnostic for the current attempt without deciding its verdict
    pub fn note(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            attempt: self.attempt,
            kind,
            message: message.into(),
        });
    }

    /// Mark the current attempt failed with a diagnostic
    pub fn record_failure(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.note(kind, message);
        self.last_outcome = Some(AttemptVerdict::Failed);
    }

    /// Mark the current attempt passed
    pub fn record_pass(&mut self) {
        self.last_outcome = Some(AttemptVerdict::Passed);
    }

    /// Move to the attempt chosen by [`decide`]
    pub fn advance(&mut self, next_attempt: u32) {
        self.attempt = next_attempt;
        self.last_outcome = None;
        self.artifact_origin = None;
    }

    /// Most recent diagnostic about the artifact's code, used for self-correction
    #[must_use]
    pub fn correction_hint(&self) -> Option<&Diagnostic> {
        self.diagnostics.iter().rev().find(|d| d.kind.concerns_code())
    }

    /// Whether the current attempt executed the fallback stub
    #[must_use]
    pub fn ran_fallback(&self) -> bool {
        self.artifact_origin == Some(ArtifactOrigin::Fallback)
    }
}

/// Decide what follows the current attempt. Pure.
#[must_use]
pub fn decide(state: &AttemptState) -> Decision {
    match state.last_outcome {
        Some(AttemptVerdict::Passed) => Decision::Terminate,
        _ => {
            let next_attempt = state.attempt + 1;
            if next_attempt < state.max_attempts {
                Decision::Retry { next_attempt }
            } else {
                Decision::Terminate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max: u32) -> AttemptState {
        AttemptState::new(Target::new("sbi").unwrap(), max)
    }

    #[test]
    fn failures_retry_until_bound() {
        let mut s = state(3);
        let mut attempts = 1;
        loop {
            s.record_failure(DiagnosticKind::Execution, "boom");
            match decide(&s) {
                Decision::Retry { next_attempt } => {
                    s.advance(next_attempt);
                    attempts += 1;
                }
                Decision::Terminate => break,
            }
        }
        assert_eq!(attempts, 3);
        assert_eq!(s.diagnostics.len(), 3);
        assert_eq!(s.diagnostics[2].attempt, 2);
    }

    #[test]
    fn pass_terminates() {
        let mut s = state(3);
        s.record_pass();
        assert_eq!(decide(&s), Decision::Terminate);
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut s = state(1);
        s.record_failure(DiagnosticKind::Mismatch, "diff");
        assert_eq!(decide(&s), Decision::Terminate);
    }

    #[test]
    fn correction_hint_skips_non_code_diagnostics() {
        let mut s = state(3);
        s.note(DiagnosticKind::Validation, "syntax error at line 3");
        s.record_failure(DiagnosticKind::Stub, "placeholder");
        assert_eq!(s.correction_hint().unwrap().message, "syntax error at line 3");

        let mut fresh = state(3);
        fresh.record_failure(DiagnosticKind::Generation, "quota");
        assert!(fresh.correction_hint().is_none());
    }

    #[test]
    fn diagnostic_display_is_one_based() {
        let d = Diagnostic {
            attempt: 0,
            kind: DiagnosticKind::Mismatch,
            message: "row 1 differs".into(),
        };
        assert_eq!(d.to_string(), "attempt 1 [mismatch]: row 1 differs");
    }
}
