//! Testing utilities for the Parser Forge workspace
//!
//! Scripted collaborators and fixtures that let the orchestrator run end to
//! end without a model or an interpreter.
//!
//! Fixture artifacts are real Python that passes syntax and contract
//! checks; a [`FakeLoader`] reads the directive comments inside them instead
//! of running them:
//!
//! - `# table: <json>`: extraction returns that table
//! - `# fail: <message>`: extraction fails with `message` on stderr
//! - `# panic: <message>`: extraction panics
//! - `# sleep-ms: <n>`: extraction sleeps first
//! - `# reject: <reason>`: the loader refuses the artifact

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forge_artifact::{
    ArtifactSource, ArtifactStore, Cell, MemoryArtifactStore, StoreError, Table, Target,
};
use forge_codegen::{
    CodeGenerator, GenerationRequest, GenerationResult, InterfaceContract, DEFAULT_COLUMNS,
};
use forge_runtime::{ArtifactLoader, ExtractError, Extractor, RegistrationError};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn target(name: &str) -> Target {
    Target::new(name).unwrap()
}

/// Two-row statement with the default columns
pub fn sample_table() -> Table {
    Table::new(DEFAULT_COLUMNS)
        .with_row(vec![
            Cell::from("01-08-2024"),
            Cell::from("Salary Credit XYZ Pvt Ltd"),
            Cell::Null,
            Cell::from(1935.3),
            Cell::from(6864.58),
        ])
        .with_row(vec![
            Cell::from("02-08-2024"),
            Cell::from("UPI Payment Grocery"),
            Cell::from(120.0),
            Cell::Null,
            Cell::from(6744.58),
        ])
}

/// Same shape as [`sample_table`], different balance on the last row
pub fn wrong_table() -> Table {
    let mut table = sample_table();
    if let Some(cell) = table.rows.last_mut().and_then(|row| row.last_mut()) {
        *cell = Cell::from(9999.0);
    }
    table
}

fn artifact_with(directive: &str) -> String {
    format!(
        "import pandas as pd\n\n# {directive}\n\n\ndef parse(pdf_path: str) -> pd.DataFrame:\n    return pd.DataFrame()\n"
    )
}

/// Valid artifact whose extraction yields `table`
pub fn parser_source(table: &Table) -> String {
    artifact_with(&format!("table: {}", serde_json::to_string(table).unwrap()))
}

/// Valid artifact whose extraction fails with `message`
pub fn failing_parser_source(message: &str) -> String {
    artifact_with(&format!("fail: {message}"))
}

/// Valid artifact whose extraction panics with `message`
pub fn panicking_parser_source(message: &str) -> String {
    artifact_with(&format!("panic: {message}"))
}

/// Valid artifact that sleeps before yielding `table`
pub fn slow_parser_source(table: &Table, delay: Duration) -> String {
    format!(
        "# sleep-ms: {}\n{}",
        delay.as_millis(),
        parser_source(table)
    )
}

/// Wrap `source` the way chat models usually answer
pub fn fenced(source: &str) -> String {
    format!("Here is the parser you asked for:\n\n```python\n{source}```\n\nLet me know if it needs changes.")
}

/// Successful generation of `source`, fenced like a model completion
pub fn completion(source: &str) -> GenerationResult {
    GenerationResult::Source(fenced(source))
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// Generator replaying a fixed sequence of results
///
/// Once the script is exhausted every call fails.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<GenerationResult>>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(results: impl IntoIterator<Item = GenerationResult>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Generator that fails every call with `reason`
    pub fn failing(reason: &str, calls: usize) -> Self {
        Self::new((0..calls).map(|_| GenerationResult::Failure(reason.to_string())))
    }

    /// Sleep before answering each call
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of generate calls so far
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Requests received, in order
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| GenerationResult::Failure("generation script exhausted".into()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FakeLoader / FakeExtractor
// ---------------------------------------------------------------------------

/// Loader enforcing the contract and binding [`FakeExtractor`]s
#[derive(Debug, Default)]
pub struct FakeLoader {
    contract: InterfaceContract,
    loads: AtomicUsize,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful loads so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ArtifactLoader for FakeLoader {
    fn load(
        &self,
        target: &Target,
        source: &ArtifactSource,
    ) -> Result<Arc<dyn Extractor>, RegistrationError> {
        self.contract
            .check(source.text())
            .map_err(|violation| RegistrationError::InterfaceMismatch {
                target: target.clone(),
                violation,
            })?;
        if let Some(reason) = source
            .text()
            .lines()
            .find_map(|line| line.trim().strip_prefix("# reject: "))
        {
            return Err(RegistrationError::LoadFailed {
                target: target.clone(),
                reason: reason.to_string(),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeExtractor::from_source(source.text())))
    }
}

/// Extractor driven by the directive comments of its source
#[derive(Debug, Clone, Default)]
pub struct FakeExtractor {
    table: Option<Table>,
    failure: Option<String>,
    panic: Option<String>,
    delay: Option<Duration>,
}

impl FakeExtractor {
    pub fn from_source(source: &str) -> Self {
        let mut extractor = Self::default();
        for line in source.lines() {
            let Some(directive) = line.trim().strip_prefix("# ") else {
                continue;
            };
            if let Some(json) = directive.strip_prefix("table: ") {
                extractor.table = serde_json::from_str(json).ok();
            } else if let Some(message) = directive.strip_prefix("fail: ") {
                extractor.failure = Some(message.to_string());
            } else if let Some(message) = directive.strip_prefix("panic: ") {
                extractor.panic = Some(message.to_string());
            } else if let Some(ms) = directive.strip_prefix("sleep-ms: ") {
                extractor.delay = ms.parse().ok().map(Duration::from_millis);
            }
        }
        extractor
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, _document: &Path) -> Result<Table, ExtractError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.panic {
            panic!("{message}");
        }
        if let Some(message) = &self.failure {
            return Err(ExtractError::Failed {
                status: "exit status: 1".into(),
                stderr: message.clone(),
            });
        }
        self.table
            .clone()
            .ok_or_else(|| ExtractError::MalformedOutput("fixture has no table directive".into()))
    }

    fn kind(&self) -> &'static str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// FailingStore
// ---------------------------------------------------------------------------

/// Store that reads from memory and refuses every write
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryArtifactStore,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an artifact that can still be read
    #[must_use]
    pub fn with_artifact(self, target: &Target, source: &str) -> Self {
        Self {
            inner: self.inner.with_artifact(target.clone(), source),
        }
    }
}

impl ArtifactStore for FailingStore {
    fn exists(&self, target: &Target) -> Result<bool, StoreError> {
        self.inner.exists(target)
    }

    fn load(&self, target: &Target) -> Result<ArtifactSource, StoreError> {
        self.inner.load(target)
    }

    fn save(&self, target: &Target, _source: &str) -> Result<ArtifactSource, StoreError> {
        Err(StoreError::Write {
            path: PathBuf::from(self.locate(target)),
            source: std::io::Error::other("disk full"),
        })
    }

    fn list(&self) -> Result<Vec<Target>, StoreError> {
        self.inner.list()
    }

    fn locate(&self, target: &Target) -> String {
        self.inner.locate(target)
    }
}
