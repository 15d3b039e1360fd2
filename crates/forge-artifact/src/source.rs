//! Artifact source text with its digest

use std::sync::Arc;

use crate::hash::ContentHash;

/// Source text of one artifact, addressed by its content hash
///
/// Invariant: `digest == ContentHash::compute(text)`. The text is shared, so
/// cloning a source is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSource {
    text: Arc<str>,
    digest: ContentHash,
}

impl ArtifactSource {
    /// Wrap source text, computing its digest
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let digest = ContentHash::compute(text.as_bytes());
        Self { text, digest }
    }

    /// Source text
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the source text
    #[inline]
    #[must_use]
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// Content digest
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    /// Size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the source is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
