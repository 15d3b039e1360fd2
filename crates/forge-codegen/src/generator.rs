//! Generation Client interface
//!
//! A [`CodeGenerator`] turns a [`GenerationRequest`] into candidate artifact
//! source. Ordinary failures are data ([`GenerationResult::Failure`]), not
//! errors, so callers can fall back without unwinding.

use std::fmt::Write as _;

use async_trait::async_trait;
use forge_artifact::Target;

use crate::contract::InterfaceContract;

/// Input to one generation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub target: Target,
    pub contract: InterfaceContract,
    /// Diagnostic from the previous failed attempt, present on self-correction
    pub prior_diagnostic: Option<String>,
}

impl GenerationRequest {
    /// Request for a fresh artifact
    #[must_use]
    pub fn new(target: Target, contract: InterfaceContract) -> Self {
        Self {
            target,
            contract,
            prior_diagnostic: None,
        }
    }

    /// Attach the diagnostic of the previous attempt
    #[must_use]
    pub fn with_prior_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.prior_diagnostic = Some(diagnostic.into());
        self
    }

    /// Whether this request asks for a correction of an earlier artifact
    #[inline]
    #[must_use]
    pub fn is_correction(&self) -> bool {
        self.prior_diagnostic.is_some()
    }

    /// Render the fixed request template
    #[must_use]
    pub fn prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "Write a Python function `{}` that extracts transactions from {} bank statements in PDF format.",
            self.contract.signature(),
            self.target
        );
        prompt.push_str("\nThe DataFrame must have exactly these columns, in this order:\n");
        for column in &self.contract.columns {
            let _ = writeln!(prompt, "- {column}");
        }
        prompt.push_str(
            "\nUse pdfplumber for PDF parsing. Ensure robust handling of headers, merged cells, \
             and numeric cleanup (remove commas, coerce to float). Empty amounts must be NaN.\n\
             Return only the complete Python module, with all imports, in a single code block.\n",
        );
        if let Some(diagnostic) = &self.prior_diagnostic {
            let _ = write!(
                prompt,
                "\nThe previous version of this parser failed with:\n{diagnostic}\n\
                 Fix the problem and return the corrected module.\n"
            );
        }
        prompt
    }
}

/// Result of one generation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationResult {
    /// Raw candidate source, not yet sanitized
    Source(String),
    /// The service could not produce a candidate
    Failure(String),
}

impl GenerationResult {
    /// Whether generation produced source text
    #[inline]
    #[must_use]
    pub fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

/// Produces candidate artifact source for a request
///
/// Implementations must not panic on ordinary failures (network, quota,
/// malformed completion, missing credentials); those are reported as
/// [`GenerationResult::Failure`].
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate candidate source for `request`
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult;

    /// Name of the backend, for logs
    fn name(&self) -> &str;
}
