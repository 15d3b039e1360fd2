use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ArtifactStore, StoreError};
use crate::source::ArtifactSource;
use crate::target::Target;

/// Filesystem-backed store laying artifacts out as `<root>/<target>_parser.py`
///
/// Writes land in a temporary file in the same directory which is then
/// renamed over the destination, so readers see either the previous or the
/// new artifact in full.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`. The directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the artifact file for `target`
    #[must_use]
    pub fn path_for(&self, target: &Target) -> PathBuf {
        self.root.join(target.artifact_file_name())
    }

    fn write_atomic(&self, path: &Path, text: &str) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, target: &Target) -> Result<bool, StoreError> {
        let path = self.path_for(target);
        path.try_exists()
            .map(|exists| exists && path.is_file())
            .map_err(|source| StoreError::Read { path, source })
    }

    fn load(&self, target: &Target) -> Result<ArtifactSource, StoreError> {
        let path = self.path_for(target);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(ArtifactSource::new(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(target.clone()))
            }
            Err(source) => Err(StoreError::Read { path, source }),
        }
    }

    fn save(&self, target: &Target, text: &str) -> Result<ArtifactSource, StoreError> {
        let path = self.path_for(target);
        self.write_atomic(&path, text)
            .map_err(|source| StoreError::Write {
                path: path.clone(),
                source,
            })?;
        let source = ArtifactSource::new(text);
        debug!(
            target = %target,
            path = %path.display(),
            digest = %source.digest().short(),
            bytes = source.len(),
            "artifact saved"
        );
        Ok(source)
    }

    fn list(&self) -> Result<Vec<Target>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::List {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut targets = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::List {
                path: self.root.clone(),
                source,
            })?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(target) = entry
                .file_name()
                .to_str()
                .and_then(Target::from_artifact_file_name)
            {
                targets.push(target);
            }
        }
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    fn locate(&self, target: &Target) -> String {
        self.path_for(target).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str) -> Target {
        Target::new(name).unwrap()
    }

    #[test]
    fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("parsers"));
        let t = target("sbi");

        assert!(!store.exists(&t).unwrap());
        assert!(store.load(&t).unwrap_err().is_not_found());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_returns_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let t = target("icici");

        let saved = store.save(&t, "def parse(p):\n    return []\n").unwrap();
        assert!(store.exists(&t).unwrap());
        assert_eq!(store.load(&t).unwrap().digest(), saved.digest());
        assert!(dir.path().join("icici_parser.py").is_file());
    }

    #[test]
    fn save_overwrites_prior_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let t = target("hdfc");

        store.save(&t, "v1\n").unwrap();
        let v2 = store.save(&t, "v2\n").unwrap();
        assert_eq!(store.load(&t).unwrap(), v2);
        // no stray temporary files left behind
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn list_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.save(&target("sbi"), "x\n").unwrap();
        store.save(&target("axis"), "x\n").unwrap();
        fs::write(dir.path().join("README.md"), "notes").unwrap();
        fs::write(dir.path().join("__init__.py"), "").unwrap();

        assert_eq!(store.list().unwrap(), vec![target("axis"), target("sbi")]);
    }

    #[test]
    fn save_into_unwritable_root_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let store = FsArtifactStore::new(&blocker);

        let err = store.save(&target("sbi"), "x\n").unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }
}
