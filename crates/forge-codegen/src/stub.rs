//! Fallback stub artifact
//!
//! When generation or validation fails the target still gets an artifact: a
//! placeholder that satisfies the interface contract and returns an empty
//! table over the contract columns. Its text carries a marker line so stored
//! stubs can be recognized and replaced on the next run.

use forge_artifact::Target;

use crate::contract::InterfaceContract;

/// First line of every stub artifact
pub const STUB_MARKER: &str = "# parser-forge: fallback stub";

/// Whether `source` is a fallback stub
#[must_use]
pub fn is_stub(source: &str) -> bool {
    source
        .lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| line.trim() == STUB_MARKER)
}

/// The designated fallback implementation for a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubArtifact {
    columns: Vec<String>,
}

impl StubArtifact {
    /// Stub producing an empty table over the contract columns
    #[must_use]
    pub fn for_contract(contract: &InterfaceContract) -> Self {
        Self {
            columns: contract.columns.clone(),
        }
    }

    /// Columns of the placeholder table
    #[inline]
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Python source persisted for `target`
    #[must_use]
    pub fn source(&self, target: &Target) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("'{}'", c.replace('\\', "\\\\").replace('\'', "\\'")))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{STUB_MARKER}\n\
             import pandas as pd\n\
             \n\
             \n\
             def parse(pdf_path: str) -> pd.DataFrame:\n    \
             # placeholder for {target}: generation did not produce a usable parser\n    \
             return pd.DataFrame(columns=[{columns}])\n"
        )
    }
}
