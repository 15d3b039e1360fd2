//! Parser Forge Runtime
//!
//! Binding, running and judging artifacts:
//!
//! - [`ArtifactRegistry`]: target → callable mapping with atomic replacement
//! - [`ArtifactLoader`] / [`PythonLoader`]: builds callables from verified source
//! - [`Executor`]: isolated, time-bounded invocation
//! - [`compare`]: the oracle deciding whether output matches a reference
//! - [`load_reference`]: CSV reference tables
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = ArtifactRegistry::new(Arc::new(PythonLoader::new("python3", contract)));
//! let handle = registry.register(&target, &source, ArtifactOrigin::Generated)?;
//! match Executor::default().run(&handle, Path::new("statement.pdf")).await {
//!     ExecutionOutcome::Success(table) => println!("{} rows", table.row_count()),
//!     ExecutionOutcome::Failure(reason) => eprintln!("{reason}"),
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod executor;
pub mod extractor;
pub mod loader;
pub mod oracle;
pub mod reference;
pub mod registry;
pub mod script;

pub use executor::{ExecutionOutcome, Executor, DEFAULT_EXECUTION_TIMEOUT};
pub use extractor::{ExtractError, Extractor, StubExtractor};
pub use loader::{ArtifactLoader, PythonLoader, RegistrationError};
pub use oracle::{compare, CompareOptions, Comparison};
pub use reference::{load_reference, read_reference, save_table, write_table, ReferenceError};
pub use registry::{
    ArtifactOrigin, ArtifactRegistry, PreparedArtifact, RegisteredHandle, RegistryError,
    WarmupReport,
};
pub use script::ScriptExtractor;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
