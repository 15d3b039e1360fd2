//! Orchestrator configuration
//!
//! [`ForgeConfig`] has sensible defaults for every field, can be adjusted
//! with `with_*` builders and loaded from TOML. Call
//! [`ForgeConfig::validate`] before use; loading from a file does so.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use forge_codegen::{
    GeminiSettings, InterfaceContract, SyntaxValidator, DEFAULT_COLUMNS, DEFAULT_MAX_SOURCE_BYTES,
};
use forge_runtime::CompareOptions;
use serde::{Deserialize, Serialize};

use crate::MAX_ATTEMPTS;

/// What a retry does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Regenerate with the failure diagnostic attached (self-correction)
    #[default]
    Regenerate,
    /// Re-execute the current artifact without generating
    ReuseArtifact,
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeConfig {
    /// Directory holding `<target>_parser.py` artifacts
    pub store_dir: PathBuf,
    /// Interpreter used to run artifacts
    pub interpreter: PathBuf,
    /// Attempts per run, including the first
    pub max_attempts: u32,
    pub retry_policy: RetryPolicy,
    /// Columns every artifact must produce
    pub columns: Vec<String>,
    /// Fail executions whose column set differs from `columns`
    pub enforce_columns: bool,
    /// Overall deadline for one run
    pub run_timeout_secs: Option<u64>,
    pub generation: GenerationConfig,
    pub execution: ExecutionConfig,
    pub compare: CompareOptions,
}

/// Generation client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationConfig {
    pub model: String,
    pub endpoint: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_source_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: forge_codegen::gemini::DEFAULT_MODEL.to_string(),
            endpoint: forge_codegen::gemini::DEFAULT_ENDPOINT.to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            timeout_secs: 120,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

/// Executor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("custom_parsers"),
            interpreter: PathBuf::from("python3"),
            max_attempts: MAX_ATTEMPTS,
            retry_policy: RetryPolicy::default(),
            columns: DEFAULT_COLUMNS.iter().map(ToString::to_string).collect(),
            enforce_columns: true,
            run_timeout_secs: None,
            generation: GenerationConfig::default(),
            execution: ExecutionConfig::default(),
            compare: CompareOptions::default(),
        }
    }
}

impl ForgeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With artifact directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// With interpreter
    #[inline]
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// With attempt bound, at most [`MAX_ATTEMPTS`]
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// With contract columns
    #[must_use]
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// With column enforcement on or off
    #[inline]
    #[must_use]
    pub fn with_enforce_columns(mut self, enforce: bool) -> Self {
        self.enforce_columns = enforce;
        self
    }

    /// With overall run deadline
    #[inline]
    #[must_use]
    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = Some(secs);
        self
    }

    /// With generation deadline
    #[inline]
    #[must_use]
    pub fn with_generation_timeout_secs(mut self, secs: u64) -> Self {
        self.generation.timeout_secs = secs;
        self
    }

    /// With execution deadline
    #[inline]
    #[must_use]
    pub fn with_execution_timeout_secs(mut self, secs: u64) -> Self {
        self.execution.timeout_secs = secs;
        self
    }

    /// With oracle options
    #[inline]
    #[must_use]
    pub fn with_compare(mut self, compare: CompareOptions) -> Self {
        self.compare = compare;
        self
    }

    /// Parse configuration from TOML text and validate it
    ///
    /// # Errors
    /// Returns error on syntax errors, unknown keys or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file and validate it
    ///
    /// # Errors
    /// Returns error if the file cannot be read or holds invalid configuration
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value constraints
    ///
    /// # Errors
    /// Returns the first invalid setting found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS}, got {}",
                self.max_attempts
            )));
        }
        if self.columns.is_empty() {
            return Err(ConfigError::Invalid("columns must not be empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(ConfigError::Invalid(format!("duplicate column '{dup}'")));
        }
        if self.interpreter.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("interpreter must not be empty".into()));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("run_timeout_secs must be positive".into()));
        }
        if self.generation.timeout_secs == 0 || self.execution.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.generation.max_source_bytes == 0 {
            return Err(ConfigError::Invalid("generation.max_source_bytes must be positive".into()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::Invalid("generation.model must not be empty".into()));
        }
        if let Some(tolerance) = self.compare.numeric_tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(ConfigError::Invalid(
                    "compare.numeric_tolerance must be a non-negative number".into(),
                ));
            }
        }
        Ok(())
    }

    /// Interface contract derived from the column list
    #[must_use]
    pub fn contract(&self) -> InterfaceContract {
        InterfaceContract::with_columns(self.columns.iter().cloned())
    }

    /// Static validator honoring the size limit
    #[must_use]
    pub fn validator(&self) -> SyntaxValidator {
        SyntaxValidator::new().with_max_source_bytes(self.generation.max_source_bytes)
    }

    /// Deadline for one generation call
    #[inline]
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.timeout_secs)
    }

    /// Deadline for one execution
    #[inline]
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    /// Overall run deadline, if any
    #[inline]
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// API key from the configured environment variable
    #[must_use]
    pub fn api_key_from_env(&self) -> Option<String> {
        std::env::var(&self.generation.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Gemini connection settings with the given key
    #[must_use]
    pub fn gemini_settings(&self, api_key: Option<String>) -> GeminiSettings {
        let settings = GeminiSettings::default()
            .with_model(self.generation.model.clone())
            .with_endpoint(self.generation.endpoint.clone())
            .with_request_timeout(self.generation_timeout());
        match api_key {
            Some(key) => settings.with_api_key(key),
            None => settings,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax error or unknown key
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value violates its constraint
    #[error("invalid config: {0}")]
    Invalid(String),
}
