//! Artifact loading
//!
//! An [`ArtifactLoader`] turns verified source text into a callable
//! [`Extractor`]. The registry calls it before binding anything, so a loader
//! rejection leaves the previous binding untouched.

use std::path::PathBuf;
use std::sync::Arc;

use forge_artifact::{ArtifactSource, Target};
use forge_codegen::{ContractViolation, InterfaceContract};

use crate::extractor::Extractor;
use crate::script::ScriptExtractor;

/// Builds an extractor from artifact source
pub trait ArtifactLoader: Send + Sync {
    /// Inspect `source` and build its extractor
    ///
    /// # Errors
    /// [`RegistrationError::InterfaceMismatch`] if the source does not expose the contract entry point
    fn load(&self, target: &Target, source: &ArtifactSource)
        -> Result<Arc<dyn Extractor>, RegistrationError>;
}

/// Loader for Python artifacts
///
/// Checks the interface contract statically and wraps the text in a
/// [`ScriptExtractor`]. The module is never imported at load time.
#[derive(Debug, Clone)]
pub struct PythonLoader {
    interpreter: PathBuf,
    contract: InterfaceContract,
}

impl PythonLoader {
    /// Loader executing artifacts with `interpreter`
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>, contract: InterfaceContract) -> Self {
        Self {
            interpreter: interpreter.into(),
            contract,
        }
    }

    /// Contract enforced at load time
    #[inline]
    #[must_use]
    pub fn contract(&self) -> &InterfaceContract {
        &self.contract
    }
}

impl ArtifactLoader for PythonLoader {
    fn load(
        &self,
        target: &Target,
        source: &ArtifactSource,
    ) -> Result<Arc<dyn Extractor>, RegistrationError> {
        self.contract
            .check(source.text())
            .map_err(|violation| RegistrationError::InterfaceMismatch {
                target: target.clone(),
                violation,
            })?;
        Ok(Arc::new(ScriptExtractor::new(
            self.interpreter.clone(),
            self.contract.entry_point.clone(),
            source.shared_text(),
        )))
    }
}

/// Registration failures
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// The artifact does not satisfy the interface contract
    #[error("artifact for '{target}' violates the interface contract: {violation}")]
    InterfaceMismatch {
        target: Target,
        #[source]
        violation: ContractViolation,
    },

    /// The loader failed for another reason
    #[error("failed to load artifact for '{target}': {reason}")]
    LoadFailed { target: Target, reason: String },
}
