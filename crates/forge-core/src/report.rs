//! Run results

use std::fmt;

use chrono::{DateTime, Utc};
use forge_artifact::{ContentHash, Table, Target};
use forge_runtime::ArtifactOrigin;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::state::Diagnostic;

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "diagnostics", rename_all = "snake_case")]
pub enum RunResult {
    /// An attempt passed
    Passed,
    /// Every attempt ran real code and none passed
    FailedAfterRetries(Vec<Diagnostic>),
    /// The final attempt had only the fallback stub to run
    GenerationFailed(Vec<Diagnostic>),
}

impl RunResult {
    /// Whether the run passed
    #[inline]
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Diagnostics of all attempts (empty when passed)
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Passed => &[],
            Self::FailedAfterRetries(d) | Self::GenerationFailed(d) => d,
        }
    }

    /// Stable lowercase name
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::FailedAfterRetries(_) => "failed_after_retries",
            Self::GenerationFailed(_) => "generation_failed",
        }
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a caller learns from one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Ulid,
    pub target: Target,
    pub result: RunResult,
    /// Attempts made, including the first
    pub attempts: u32,
    pub generation_calls: u32,
    pub executions: u32,
    /// Digest of the artifact bound at termination
    pub digest: Option<ContentHash>,
    pub origin: Option<ArtifactOrigin>,
    /// Table of the last successful execution
    pub table: Option<Table>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Wall-clock duration of the run in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
