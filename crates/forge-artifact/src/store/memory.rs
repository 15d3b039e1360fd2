use dashmap::DashMap;

use super::{ArtifactStore, StoreError};
use crate::source::ArtifactSource;
use crate::target::Target;

/// In-memory artifact store
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: DashMap<Target, ArtifactSource>,
}

impl MemoryArtifactStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style seeding of a stored artifact
    #[must_use]
    pub fn with_artifact(self, target: Target, text: &str) -> Self {
        self.artifacts.insert(target, ArtifactSource::new(text));
        self
    }

    /// Number of stored artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn exists(&self, target: &Target) -> Result<bool, StoreError> {
        Ok(self.artifacts.contains_key(target))
    }

    fn load(&self, target: &Target) -> Result<ArtifactSource, StoreError> {
        self.artifacts
            .get(target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(target.clone()))
    }

    fn save(&self, target: &Target, text: &str) -> Result<ArtifactSource, StoreError> {
        let source = ArtifactSource::new(text);
        self.artifacts.insert(target.clone(), source.clone());
        Ok(source)
    }

    fn list(&self) -> Result<Vec<Target>, StoreError> {
        let mut targets: Vec<Target> = self.artifacts.iter().map(|e| e.key().clone()).collect();
        targets.sort();
        Ok(targets)
    }

    fn locate(&self, target: &Target) -> String {
        format!("memory://{}", target.artifact_file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites_and_lists_sorted() {
        let sbi = Target::new("sbi").unwrap();
        let axis = Target::new("axis").unwrap();
        let store = MemoryArtifactStore::new().with_artifact(sbi.clone(), "old\n");

        store.save(&axis, "a\n").unwrap();
        let new = store.save(&sbi, "new\n").unwrap();

        assert_eq!(store.load(&sbi).unwrap(), new);
        assert_eq!(store.list().unwrap(), vec![axis, sbi]);
        assert_eq!(store.len(), 2);
    }
}
