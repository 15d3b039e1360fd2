//! Artifact Store
//!
//! Durable, addressable storage of artifact source text keyed by [`Target`].
//! At most one artifact exists per target; saving overwrites.
//!
//! Two implementations ship with the crate:
//! - [`FsArtifactStore`]: one `<target>_parser.py` file per target under a root directory
//! - [`MemoryArtifactStore`]: DashMap-backed, for tests and embedding

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use std::path::PathBuf;

use crate::source::ArtifactSource;
use crate::target::Target;

/// Storage of artifact source text
///
/// Implementations never retry failed writes; the caller decides what a
/// persistence failure means.
pub trait ArtifactStore: Send + Sync {
    /// Whether an artifact is stored for `target`. No side effects.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be queried
    fn exists(&self, target: &Target) -> Result<bool, StoreError>;

    /// Load the stored artifact for `target`
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if nothing is stored, [`StoreError::Read`] on I/O failure
    fn load(&self, target: &Target) -> Result<ArtifactSource, StoreError>;

    /// Persist `text` as the artifact for `target`, replacing any prior one
    ///
    /// # Errors
    /// [`StoreError::Write`] if the text could not be durably written
    fn save(&self, target: &Target, text: &str) -> Result<ArtifactSource, StoreError>;

    /// All stored targets, sorted
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be enumerated
    fn list(&self) -> Result<Vec<Target>, StoreError>;

    /// Human-readable location of the artifact for `target`
    fn locate(&self, target: &Target) -> String;
}

/// Artifact store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No artifact is stored for the target
    #[error("no artifact stored for target '{0}'")]
    NotFound(Target),

    /// Reading a stored artifact failed
    #[error("failed to read artifact at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisting an artifact failed
    #[error("failed to write artifact at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Enumerating the store failed
    #[error("failed to list artifacts in {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Whether the error only reports a missing artifact
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
