//! Extractor interface
//!
//! An [`Extractor`] is the callable bound to a target in the registry: given
//! a document path it produces a [`Table`].

use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use forge_artifact::Table;

/// Callable entry point of a registered artifact
#[async_trait]
pub trait Extractor: Send + Sync + Debug {
    /// Extract a table from `document`
    async fn extract(&self, document: &Path) -> Result<Table, ExtractError>;

    /// Short name of the implementation, for logs
    fn kind(&self) -> &'static str;
}

/// Designated fallback implementation: an empty table over fixed columns
#[derive(Debug, Clone)]
pub struct StubExtractor {
    columns: Vec<String>,
}

impl StubExtractor {
    /// Stub producing an empty table with `columns`
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, _document: &Path) -> Result<Table, ExtractError> {
        Ok(Table::new(self.columns.iter().cloned()))
    }

    fn kind(&self) -> &'static str {
        "stub"
    }
}

/// Extraction failures
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Input document does not exist
    #[error("input document not found: {0}")]
    DocumentMissing(PathBuf),

    /// Preparing the scratch directory failed
    #[error("failed to prepare artifact workspace: {0}")]
    Workspace(#[source] std::io::Error),

    /// The interpreter could not be started
    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact raised or exited abnormally
    #[error("artifact exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The artifact's output could not be read as a table
    #[error("artifact produced unreadable output: {0}")]
    MalformedOutput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_returns_empty_table_with_columns() {
        let stub = StubExtractor::new(vec!["Date".into(), "Balance".into()]);
        let table = stub.extract(Path::new("missing.pdf")).await.unwrap();
        assert_eq!(table.columns, vec!["Date", "Balance"]);
        assert_eq!(table.row_count(), 0);
        assert_eq!(stub.kind(), "stub");
    }
}
