//! Script extractor
//!
//! Runs a Python artifact in a child interpreter. The artifact text and a
//! fixed harness are written into a fresh scratch directory and executed as
//! `<interpreter> harness.py artifact.py <document> <entry_point>`. The
//! harness prints the resulting table as JSON on stdout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use forge_artifact::Table;
use tokio::process::Command;
use tracing::debug;

use crate::extractor::{ExtractError, Extractor};

/// Harness that imports the artifact and serializes its table
pub const HARNESS: &str = include_str!("harness.py");

const HARNESS_FILE: &str = "harness.py";
const ARTIFACT_FILE: &str = "artifact.py";

/// Lines of stderr kept in failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Extractor that executes artifact source in a child interpreter
#[derive(Debug, Clone)]
pub struct ScriptExtractor {
    interpreter: PathBuf,
    entry_point: String,
    source: Arc<str>,
}

impl ScriptExtractor {
    /// Extractor running `source` with `interpreter`, calling `entry_point`
    #[must_use]
    pub fn new(interpreter: impl Into<PathBuf>, entry_point: impl Into<String>, source: Arc<str>) -> Self {
        Self {
            interpreter: interpreter.into(),
            entry_point: entry_point.into(),
            source,
        }
    }

    /// Interpreter used for execution
    #[inline]
    #[must_use]
    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    async fn prepare(&self) -> Result<tempfile::TempDir, std::io::Error> {
        let dir = tempfile::Builder::new().prefix("parser-forge-").tempdir()?;
        tokio::fs::write(dir.path().join(HARNESS_FILE), HARNESS).await?;
        tokio::fs::write(dir.path().join(ARTIFACT_FILE), self.source.as_bytes()).await?;
        Ok(dir)
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    async fn extract(&self, document: &Path) -> Result<Table, ExtractError> {
        if !tokio::fs::try_exists(document).await.unwrap_or(false) {
            return Err(ExtractError::DocumentMissing(document.to_path_buf()));
        }
        let workspace = self.prepare().await.map_err(ExtractError::Workspace)?;

        debug!(
            interpreter = %self.interpreter.display(),
            document = %document.display(),
            workspace = %workspace.path().display(),
            "running artifact"
        );

        let child = Command::new(&self.interpreter)
            .arg(workspace.path().join(HARNESS_FILE))
            .arg(workspace.path().join(ARTIFACT_FILE))
            .arg(document)
            .arg(&self.entry_point)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractError::Spawn {
                interpreter: self.interpreter.display().to_string(),
                source,
            })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(ExtractError::Workspace)?;

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |code| format!("exit code {code}"));
            return Err(ExtractError::Failed {
                status,
                stderr: stderr_tail(&String::from_utf8_lossy(&output.stderr)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<Table>(stdout.trim())
            .map_err(|e| ExtractError::MalformedOutput(e.to_string()))
    }

    fn kind(&self) -> &'static str {
        "script"
    }
}

/// Last lines of stderr, where a Python traceback ends with the actual error
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "(no stderr output)".to_string();
    }
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
