//! Parser Forge Artifact Model
//!
//! Targets, content-addressed artifact sources, tabular results and the
//! artifact store.
//!
//! # Core Concepts
//!
//! - [`Target`]: validated identifier of a document class
//! - [`ArtifactSource`]: artifact text plus its [`ContentHash`]
//! - [`Table`] / [`Cell`]: the tabular result an artifact produces
//! - [`ArtifactStore`]: durable storage, one artifact per target
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::{ArtifactStore, FsArtifactStore, Target};
//!
//! let store = FsArtifactStore::new("custom_parsers");
//! let target: Target = "sbi".parse()?;
//! let saved = store.save(&target, "def parse(pdf_path):\n    ...\n")?;
//! println!("{} -> {}", store.locate(&target), saved.digest().short());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod source;
mod table;
mod target;

pub mod store;

pub use hash::{ContentHash, HashError};
pub use source::ArtifactSource;
pub use store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore, StoreError};
pub use table::{Cell, Table, TableError};
pub use target::{Target, TargetError, ARTIFACT_SUFFIX, MAX_TARGET_LEN};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
