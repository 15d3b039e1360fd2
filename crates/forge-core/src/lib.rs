//! Parser Forge Core
//!
//! The self-correcting orchestrator that turns a target identifier and an
//! input document into a validated table, synthesizing the parser on demand.
//!
//! # Core Concepts
//!
//! - **Run**: one pass of the loop for one target, bounded by [`MAX_ATTEMPTS`]
//! - **Phase**: Plan, `EnsureArtifact`, Execute, Validate, Retry, Terminate
//! - **Artifact**: persisted parser source, reused across runs by target
//! - **Fallback**: a stub bound when generation fails, so execution always
//!   has something to run
//! - **Diagnostic**: a recorded failure, fed back into the next generation
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{ForgeConfig, Orchestrator, RunRequest};
//!
//! let config = ForgeConfig::from_toml_file("forge.toml")?;
//! let generator = Arc::new(GeminiGenerator::new(config.gemini_settings(config.api_key_from_env()))?);
//! let orchestrator = Orchestrator::with_defaults(config, generator)?;
//!
//! let request = RunRequest::new(Target::new("icici")?, "data/icici/sample.pdf")
//!     .with_expected(load_reference(Path::new("data/icici/result.csv"))?);
//! let report = orchestrator.run(request).await?;
//! println!("{} after {} attempt(s)", report.result, report.attempts);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod error;
pub mod obs;
pub mod orchestrator;
pub mod phase;
pub mod report;
pub mod state;

pub use config::{ConfigError, ExecutionConfig, ForgeConfig, GenerationConfig, RetryPolicy};
pub use error::ForgeError;
pub use orchestrator::{execute_stored, Orchestrator, RunRequest};
pub use phase::{allowed_transitions, validate_transition, Phase, PhaseError};
pub use report::{RunReport, RunResult};
pub use state::{decide, AttemptState, AttemptVerdict, Decision, Diagnostic, DiagnosticKind};

/// Attempts per run, including the first
pub const MAX_ATTEMPTS: u32 = 3;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
