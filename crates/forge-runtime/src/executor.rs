//! Executor
//!
//! Invokes a registered extractor against an input document and captures
//! the outcome. The call runs on its own task under a deadline; panics,
//! timeouts, extractor errors and malformed tables all come back as
//! [`ExecutionOutcome::Failure`]. Nothing escapes to the caller.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use forge_artifact::Table;
use tracing::{debug, warn};

use crate::registry::RegisteredHandle;

/// Default execution deadline
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one execution
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Success(Table),
    Failure(String),
}

impl ExecutionOutcome {
    /// Whether the execution produced a table
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Runs registered extractors in isolation
#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
    required_columns: Option<Vec<String>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXECUTION_TIMEOUT,
            required_columns: None,
        }
    }
}

impl Executor {
    /// Executor with the given deadline and no column enforcement
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            required_columns: None,
        }
    }

    /// Require tables to carry exactly this column set (any order)
    #[must_use]
    pub fn with_required_columns(mut self, columns: Vec<String>) -> Self {
        self.required_columns = Some(columns);
        self
    }

    /// Execution deadline
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `handle` against `document`
    pub async fn run(&self, handle: &RegisteredHandle, document: &Path) -> ExecutionOutcome {
        let extractor = handle.extractor();
        let document = document.to_path_buf();
        let started = Instant::now();

        let task = tokio::spawn(async move { extractor.extract(&document).await });
        let abort = task.abort_handle();

        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                abort.abort();
                ExecutionOutcome::Failure(format!(
                    "execution timed out after {}s",
                    self.timeout.as_secs_f64()
                ))
            }
            Ok(Err(join_error)) if join_error.is_panic() => {
                ExecutionOutcome::Failure(format!("artifact panicked: {}", panic_message(join_error)))
            }
            Ok(Err(join_error)) => {
                ExecutionOutcome::Failure(format!("execution task failed: {join_error}"))
            }
            Ok(Ok(Err(e))) => ExecutionOutcome::Failure(e.to_string()),
            Ok(Ok(Ok(table))) => self.check_table(table),
        };

        let elapsed_ms = started.elapsed().as_millis();
        match &outcome {
            ExecutionOutcome::Success(table) => debug!(
                target = %handle.target(),
                digest = %handle.digest().short(),
                rows = table.row_count(),
                elapsed_ms,
                "execution succeeded"
            ),
            ExecutionOutcome::Failure(reason) => warn!(
                target = %handle.target(),
                digest = %handle.digest().short(),
                elapsed_ms,
                reason = %reason,
                "execution failed"
            ),
        }
        outcome
    }

    fn check_table(&self, table: Table) -> ExecutionOutcome {
        if let Err(e) = table.check_well_formed() {
            return ExecutionOutcome::Failure(format!("malformed table: {e}"));
        }
        if let Some(required) = &self.required_columns {
            let expected: BTreeSet<&str> = required.iter().map(String::as_str).collect();
            let actual: BTreeSet<&str> = table.columns.iter().map(String::as_str).collect();
            if expected != actual {
                let missing: Vec<&str> = expected.difference(&actual).copied().collect();
                let unexpected: Vec<&str> = actual.difference(&expected).copied().collect();
                return ExecutionOutcome::Failure(format!(
                    "column mismatch: missing {missing:?}, unexpected {unexpected:?}"
                ));
            }
        }
        ExecutionOutcome::Success(table)
    }
}

fn panic_message(join_error: tokio::task::JoinError) -> String {
    let payload = join_error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
