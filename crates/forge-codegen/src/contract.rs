//! Artifact interface contract
//!
//! Every artifact exposes a single entry point, `parse(pdf_path)`, returning
//! a table over the contract columns. [`InterfaceContract::check`] verifies
//! the entry point statically from the syntax tree.

use serde::{Deserialize, Serialize};

use crate::syntax::parse_python;

/// Entry point every artifact must define
pub const ENTRY_POINT: &str = "parse";

/// Columns of a bank statement table
pub const DEFAULT_COLUMNS: [&str; 5] = ["Date", "Description", "Debit Amt", "Credit Amt", "Balance"];

/// The calling convention and output shape required of artifacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceContract {
    pub entry_point: String,
    pub columns: Vec<String>,
}

impl Default for InterfaceContract {
    fn default() -> Self {
        Self {
            entry_point: ENTRY_POINT.to_string(),
            columns: DEFAULT_COLUMNS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl InterfaceContract {
    /// Contract with the default entry point and the given columns
    #[must_use]
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entry_point: ENTRY_POINT.to_string(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Signature line used in prompts
    #[must_use]
    pub fn signature(&self) -> String {
        format!("{}(pdf_path: str) -> pd.DataFrame", self.entry_point)
    }

    /// Verify that `source` defines the entry point at module level taking
    /// exactly one required positional parameter
    ///
    /// # Errors
    /// Returns the violation found
    pub fn check(&self, source: &str) -> Result<(), ContractViolation> {
        let tree = parse_python(source).map_err(ContractViolation::Unparseable)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(ContractViolation::Unparseable(
                "source has syntax errors".to_string(),
            ));
        }

        // the last top-level binding wins, as it would at import time
        let mut entry = None;
        for i in 0..root.child_count() {
            let Some(child) = root.child(i) else { continue };
            let def = match child.kind() {
                "function_definition" => Some(child),
                "decorated_definition" => child
                    .child_by_field_name("definition")
                    .filter(|d| d.kind() == "function_definition"),
                _ => None,
            };
            if let Some(def) = def {
                let name = def
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source.as_bytes()).ok());
                if name == Some(self.entry_point.as_str()) {
                    entry = Some(def);
                }
            }
        }

        let def = entry.ok_or_else(|| ContractViolation::MissingEntryPoint(self.entry_point.clone()))?;
        if def.child(0).is_some_and(|first| first.kind() == "async") {
            return Err(ContractViolation::AsyncEntryPoint(self.entry_point.clone()));
        }

        let (positional, keyword_only) = def
            .child_by_field_name("parameters")
            .map_or((0, 0), |params| count_required(params));
        if positional != 1 || keyword_only != 0 {
            return Err(ContractViolation::Arity {
                entry_point: self.entry_point.clone(),
                positional,
                keyword_only,
            });
        }
        Ok(())
    }
}

/// Count required positional and required keyword-only parameters
fn count_required(params: tree_sitter::Node<'_>) -> (usize, usize) {
    let mut positional = 0;
    let mut keyword_only = 0;
    let mut after_star = false;

    for i in 0..params.named_child_count() {
        let Some(param) = params.named_child(i) else { continue };
        match param.kind() {
            "identifier" => {
                if after_star {
                    keyword_only += 1;
                } else {
                    positional += 1;
                }
            }
            "typed_parameter" => {
                let splat = param
                    .named_child(0)
                    .map(|inner| inner.kind().to_string());
                match splat.as_deref() {
                    Some("list_splat_pattern") => after_star = true,
                    Some("dictionary_splat_pattern") => {}
                    _ if after_star => keyword_only += 1,
                    _ => positional += 1,
                }
            }
            "list_splat_pattern" | "keyword_separator" => after_star = true,
            // defaults, **kwargs and the positional-only marker are never required
            _ => {}
        }
    }
    (positional, keyword_only)
}

/// Ways a source can violate the interface contract
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// The source could not be parsed
    #[error("cannot inspect source: {0}")]
    Unparseable(String),

    /// No module-level definition of the entry point
    #[error("no top-level function '{0}' defined")]
    MissingEntryPoint(String),

    /// The entry point is a coroutine
    #[error("entry point '{0}' must not be async")]
    AsyncEntryPoint(String),

    /// Wrong number of required parameters
    #[error("entry point '{entry_point}' must take exactly one required positional parameter (found {positional} positional, {keyword_only} keyword-only)")]
    Arity {
        entry_point: String,
        positional: usize,
        keyword_only: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Result<(), ContractViolation> {
        InterfaceContract::default().check(source)
    }

    #[test]
    fn typed_single_parameter_satisfies_contract() {
        let source = "import pandas as pd\n\ndef parse(pdf_path: str) -> pd.DataFrame:\n    return pd.DataFrame()\n";
        assert_eq!(check(source), Ok(()));
    }

    #[test]
    fn optional_extras_are_allowed() {
        assert_eq!(check("def parse(path, strict=False, *args, **kwargs):\n    pass\n"), Ok(()));
        assert_eq!(check("def parse(path, /, *, debug: bool = False):\n    pass\n"), Ok(()));
    }

    #[test]
    fn decorated_entry_point_is_found() {
        let source = "import functools\n\n@functools.lru_cache\ndef parse(p):\n    return p\n";
        assert_eq!(check(source), Ok(()));
    }

    #[test]
    fn nested_definition_does_not_count() {
        let source = "class Parser:\n    def parse(self, p):\n        return p\n";
        assert_eq!(
            check(source),
            Err(ContractViolation::MissingEntryPoint("parse".to_string()))
        );
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert!(matches!(
            check("def parse():\n    pass\n"),
            Err(ContractViolation::Arity { positional: 0, .. })
        ));
        assert!(matches!(
            check("def parse(a, b):\n    pass\n"),
            Err(ContractViolation::Arity { positional: 2, .. })
        ));
        assert!(matches!(
            check("def parse(a, *, mode):\n    pass\n"),
            Err(ContractViolation::Arity { keyword_only: 1, .. })
        ));
    }

    #[test]
    fn async_entry_point_is_rejected() {
        assert_eq!(
            check("async def parse(p):\n    return p\n"),
            Err(ContractViolation::AsyncEntryPoint("parse".to_string()))
        );
    }

    #[test]
    fn last_definition_wins() {
        let source = "def parse(p):\n    return p\n\ndef parse(a, b):\n    return a\n";
        assert!(matches!(check(source), Err(ContractViolation::Arity { .. })));
    }

    #[test]
    fn signature_mentions_entry_point() {
        assert_eq!(
            InterfaceContract::default().signature(),
            "parse(pdf_path: str) -> pd.DataFrame"
        );
    }
}
