//! Dynamic Registry
//!
//! Maps each target to the callable currently bound to it. Binding only
//! happens through [`ArtifactRegistry::register`] (verified code) or
//! [`ArtifactRegistry::bind_stub`] (the designated fallback), and a handle is
//! fully built before it is published with a single map insert. Readers
//! therefore observe the old binding or the new one, never a partial one.
//! Concurrent registrations for the same target are serialized by the map's
//! shard lock; the last writer wins.
//!
//! Callers that must persist an artifact before it becomes visible split
//! registration in two: [`ArtifactRegistry::prepare`] runs the loader
//! without touching the map, [`ArtifactRegistry::commit`] publishes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use forge_artifact::{ArtifactSource, ArtifactStore, ContentHash, StoreError, Target};
use forge_codegen::{is_stub, StubArtifact};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::extractor::{Extractor, StubExtractor};
use crate::loader::{ArtifactLoader, RegistrationError};

/// Where a registered artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Loaded from the artifact store
    Stored,
    /// Produced by the generator during this process
    Generated,
    /// The fallback stub
    Fallback,
}

impl fmt::Display for ArtifactOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stored => "stored",
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        })
    }
}

/// A bound callable plus the identity of the text it was built from
#[derive(Debug, Clone)]
pub struct RegisteredHandle {
    target: Target,
    digest: ContentHash,
    origin: ArtifactOrigin,
    revision: u64,
    extractor: Arc<dyn Extractor>,
}

impl RegisteredHandle {
    /// Target the handle is bound to
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Digest of the source the handle was built from
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        self.digest
    }

    /// Origin of the artifact
    #[inline]
    #[must_use]
    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }

    /// Whether the handle is the fallback stub
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.origin == ArtifactOrigin::Fallback
    }

    /// Registry-wide monotonically increasing binding number
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The callable
    #[inline]
    #[must_use]
    pub fn extractor(&self) -> Arc<dyn Extractor> {
        Arc::clone(&self.extractor)
    }
}

/// Source the loader accepted, not yet bound to its target
#[derive(Debug)]
#[must_use = "a prepared artifact is not bound until committed"]
pub struct PreparedArtifact {
    target: Target,
    digest: ContentHash,
    extractor: Arc<dyn Extractor>,
}

impl PreparedArtifact {
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Digest of the accepted source
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        self.digest
    }
}

/// Lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Nothing is bound to the target
    #[error("no artifact registered for target '{0}'")]
    NotRegistered(Target),
}

/// Result of [`ArtifactRegistry::warm_from`]
#[derive(Debug, Default)]
pub struct WarmupReport {
    pub registered: Vec<Target>,
    pub stubs: Vec<Target>,
    pub failed: Vec<(Target, String)>,
}

impl WarmupReport {
    /// Whether every stored artifact was bound
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Process-wide mapping from target to bound extractor
pub struct ArtifactRegistry {
    entries: DashMap<Target, Arc<RegisteredHandle>>,
    loader: Arc<dyn ArtifactLoader>,
    revision: AtomicU64,
}

impl fmt::Debug for ArtifactRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactRegistry")
            .field("entries", &self.entries.len())
            .field("revision", &self.revision.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ArtifactRegistry {
    /// Empty registry using `loader` to build extractors
    #[must_use]
    pub fn new(loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            entries: DashMap::new(),
            loader,
            revision: AtomicU64::new(0),
        }
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn publish(
        &self,
        target: &Target,
        digest: ContentHash,
        origin: ArtifactOrigin,
        extractor: Arc<dyn Extractor>,
    ) -> Arc<RegisteredHandle> {
        // revision is drawn under the shard lock so per-target order matches insertion order
        let entry = self.entries.entry(target.clone());
        let handle = Arc::new(RegisteredHandle {
            target: target.clone(),
            digest,
            origin,
            revision: self.next_revision(),
            extractor,
        });
        drop(entry.insert(Arc::clone(&handle)));
        let revision = handle.revision;
        debug!(
            target = %target,
            digest = %digest.short(),
            %origin,
            revision,
            "artifact bound"
        );
        handle
    }

    /// Bind verified source to `target`, replacing any prior binding
    ///
    /// # Errors
    /// Returns the loader's rejection; the prior binding stays in place
    pub fn register(
        &self,
        target: &Target,
        source: &ArtifactSource,
        origin: ArtifactOrigin,
    ) -> Result<Arc<RegisteredHandle>, RegistrationError> {
        let prepared = self.prepare(target, source)?;
        Ok(self.commit(prepared, origin))
    }

    /// Run the loader on `source` without binding anything
    ///
    /// # Errors
    /// Returns the loader's rejection
    pub fn prepare(
        &self,
        target: &Target,
        source: &ArtifactSource,
    ) -> Result<PreparedArtifact, RegistrationError> {
        let extractor = self.loader.load(target, source)?;
        Ok(PreparedArtifact {
            target: target.clone(),
            digest: source.digest(),
            extractor,
        })
    }

    /// Bind a prepared artifact, replacing any prior binding
    pub fn commit(
        &self,
        prepared: PreparedArtifact,
        origin: ArtifactOrigin,
    ) -> Arc<RegisteredHandle> {
        let PreparedArtifact {
            target,
            digest,
            extractor,
        } = prepared;
        self.publish(&target, digest, origin, extractor)
    }

    /// Bind the fallback implementation to `target`
    ///
    /// `source` is the stub text that was persisted, so the handle's digest
    /// still matches the store.
    pub fn bind_stub(
        &self,
        target: &Target,
        source: &ArtifactSource,
        stub: &StubArtifact,
    ) -> Arc<RegisteredHandle> {
        let extractor: Arc<dyn Extractor> = Arc::new(StubExtractor::new(stub.columns().to_vec()));
        self.publish(target, source.digest(), ArtifactOrigin::Fallback, extractor)
    }

    /// Current binding for `target`
    ///
    /// # Errors
    /// [`RegistryError::NotRegistered`] if nothing is bound
    pub fn lookup(&self, target: &Target) -> Result<Arc<RegisteredHandle>, RegistryError> {
        self.entries
            .get(target)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NotRegistered(target.clone()))
    }

    /// Whether `target` is bound to the artifact with `digest`
    #[must_use]
    pub fn is_current(&self, target: &Target, digest: ContentHash) -> bool {
        self.entries
            .get(target)
            .is_some_and(|entry| entry.digest == digest)
    }

    /// Bound targets, sorted
    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self.entries.iter().map(|e| e.key().clone()).collect();
        targets.sort();
        targets
    }

    /// Number of bound targets
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind every artifact in `store`
    ///
    /// Stored stubs are bound to the fallback implementation. Per-target
    /// failures are collected in the report instead of aborting.
    ///
    /// # Errors
    /// Returns error only if the store cannot be enumerated
    pub fn warm_from(
        &self,
        store: &dyn ArtifactStore,
        stub: &StubArtifact,
    ) -> Result<WarmupReport, StoreError> {
        let mut report = WarmupReport::default();
        for target in store.list()? {
            let source = match store.load(&target) {
                Ok(source) => source,
                Err(e) => {
                    warn!(target = %target, error = %e, "skipping unreadable artifact");
                    report.failed.push((target, e.to_string()));
                    continue;
                }
            };
            if self.is_current(&target, source.digest()) {
                report.registered.push(target);
                continue;
            }
            if is_stub(source.text()) {
                self.bind_stub(&target, &source, stub);
                report.stubs.push(target);
                continue;
            }
            match self.register(&target, &source, ArtifactOrigin::Stored) {
                Ok(_) => report.registered.push(target),
                Err(e) => {
                    warn!(target = %target, error = %e, "skipping artifact that failed to load");
                    report.failed.push((target, e.to_string()));
                }
            }
        }
        info!(
            registered = report.registered.len(),
            stubs = report.stubs.len(),
            failed = report.failed.len(),
            "registry warmed from store"
        );
        Ok(report)
    }
}
