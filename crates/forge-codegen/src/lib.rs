//! Parser Forge Code Generation
//!
//! Everything between "ask a model for code" and "text safe to persist":
//!
//! - [`CodeGenerator`]: the generation client interface, with a Gemini backend
//! - [`sanitize`]: strips markdown fences and normalizes whitespace
//! - [`SyntaxValidator`]: fail-closed static check with tree-sitter-python
//! - [`InterfaceContract`]: the `parse(pdf_path)` entry point every artifact must expose
//! - [`StubArtifact`]: the fallback placeholder used when generation fails
//!
//! # Example
//!
//! ```rust,ignore
//! let raw = match generator.generate(&request).await {
//!     GenerationResult::Source(raw) => raw,
//!     GenerationResult::Failure(reason) => return fallback(reason),
//! };
//! let cleaned = sanitize(&raw);
//! if let ValidationOutcome::Invalid(diagnostic) = validator.validate(&cleaned) {
//!     return fallback(diagnostic);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod contract;
pub mod gemini;
pub mod generator;
pub mod sanitize;
pub mod stub;
pub mod syntax;

pub use contract::{ContractViolation, InterfaceContract, DEFAULT_COLUMNS, ENTRY_POINT};
pub use gemini::{GeminiError, GeminiGenerator, GeminiSettings};
pub use generator::{CodeGenerator, GenerationRequest, GenerationResult};
pub use sanitize::sanitize;
pub use stub::{is_stub, StubArtifact, STUB_MARKER};
pub use syntax::{validate, SyntaxValidator, ValidationOutcome, DEFAULT_MAX_SOURCE_BYTES};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
