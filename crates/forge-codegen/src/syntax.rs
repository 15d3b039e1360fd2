//! Static validation of artifact source
//!
//! Parses cleaned text with the tree-sitter Python grammar. Nothing is ever
//! imported or executed. Validation fails closed: anything that prevents a
//! clean parse (size, parser setup, missing tree, error nodes) is `Invalid`.
//!
//! The grammar is more permissive than the Python 3 compiler, so a clean
//! tree is also checked for constructs the compiler rejects: Python 2
//! `print`/`exec` statements, `return`/`yield` outside a function and
//! `break`/`continue` outside a loop.

use std::fmt::{self, Display, Formatter};

/// Default upper bound for artifact source size (256 KiB)
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 256 * 1024;

/// Outcome of static validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The text parses cleanly
    Valid,
    /// The text was rejected, with a diagnostic
    Invalid(String),
}

impl ValidationOutcome {
    /// Whether the outcome is [`ValidationOutcome::Valid`]
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl Display for ValidationOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => f.write_str("valid"),
            Self::Invalid(diagnostic) => write!(f, "invalid: {diagnostic}"),
        }
    }
}

/// Parse Python source into a syntax tree
///
/// # Errors
/// Returns a diagnostic if the grammar cannot be loaded or parsing yields no tree
pub(crate) fn parse_python(source: &str) -> Result<tree_sitter::Tree, String> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| format!("python parser initialisation failed: {e}"))?;
    parser
        .parse(source, None)
        .ok_or_else(|| "python parser produced no syntax tree".to_string())
}

/// Syntax validator with a size limit
#[derive(Debug, Clone, Copy)]
pub struct SyntaxValidator {
    max_source_bytes: usize,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }
}

impl SyntaxValidator {
    /// Validator with the default size limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted source size
    #[must_use]
    pub fn with_max_source_bytes(mut self, max: usize) -> Self {
        self.max_source_bytes = max;
        self
    }

    /// Maximum accepted source size
    #[inline]
    #[must_use]
    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    /// Check that `cleaned` is syntactically well-formed Python
    #[must_use]
    pub fn validate(&self, cleaned: &str) -> ValidationOutcome {
        if cleaned.trim().is_empty() {
            return ValidationOutcome::Invalid("source is empty".to_string());
        }
        if cleaned.len() > self.max_source_bytes {
            return ValidationOutcome::Invalid(format!(
                "source is {} bytes, limit is {}",
                cleaned.len(),
                self.max_source_bytes
            ));
        }

        let tree = match parse_python(cleaned) {
            Ok(tree) => tree,
            Err(diagnostic) => return ValidationOutcome::Invalid(diagnostic),
        };

        let root = tree.root_node();
        if root.has_error() {
            return match first_error_node(root) {
                Some(node) => ValidationOutcome::Invalid(describe_error(node, cleaned)),
                None => ValidationOutcome::Invalid("syntax error".to_string()),
            };
        }
        match first_rejected_construct(root) {
            Some((node, reason)) => {
                let position = node.start_position();
                ValidationOutcome::Invalid(format!(
                    "syntax error at line {}, column {}: {reason}",
                    position.row + 1,
                    position.column + 1
                ))
            }
            None => ValidationOutcome::Valid,
        }
    }
}

/// Validate with the default size limit
#[must_use]
pub fn validate(cleaned: &str) -> ValidationOutcome {
    SyntaxValidator::default().validate(cleaned)
}

/// First `ERROR` or `MISSING` node in document order
fn first_error_node(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if let Some(found) = first_error_node(child) {
                return Some(found);
            }
        }
    }
    None
}

/// First node the grammar accepts but the Python 3 compiler does not
fn first_rejected_construct(
    node: tree_sitter::Node<'_>,
) -> Option<(tree_sitter::Node<'_>, &'static str)> {
    let reason = match node.kind() {
        "print_statement" => Some("Python 2 print statement, use print(...)"),
        "exec_statement" => Some("Python 2 exec statement, use exec(...)"),
        "return_statement" if !inside_function(node, false) => Some("'return' outside function"),
        "yield" if !inside_function(node, true) => Some("'yield' outside function"),
        "break_statement" if !inside_loop(node) => Some("'break' outside loop"),
        "continue_statement" if !inside_loop(node) => Some("'continue' not properly in loop"),
        _ => None,
    };
    if let Some(reason) = reason {
        return Some((node, reason));
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if let Some(found) = first_rejected_construct(child) {
                return Some(found);
            }
        }
    }
    None
}

/// Whether the nearest enclosing scope is a function (or a lambda, if allowed)
fn inside_function(node: tree_sitter::Node<'_>, lambda_counts: bool) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "function_definition" => return true,
            "lambda" if lambda_counts => return true,
            "class_definition" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

/// Whether `node` sits in a loop body of its own function or class scope
fn inside_loop(node: tree_sitter::Node<'_>) -> bool {
    let mut child = node;
    while let Some(parent) = child.parent() {
        match parent.kind() {
            // the else clause of a loop runs after the loop, not in it
            "for_statement" | "while_statement" if child.kind() != "else_clause" => return true,
            "function_definition" | "class_definition" => return false,
            _ => child = parent,
        }
    }
    false
}

fn describe_error(node: tree_sitter::Node<'_>, source: &str) -> String {
    let position = node.start_position();
    let (line, column) = (position.row + 1, position.column + 1);
    if node.is_missing() {
        return format!("syntax error at line {line}, column {column}: missing '{}'", node.kind());
    }
    let snippet: String = node
        .utf8_text(source.as_bytes())
        .unwrap_or("")
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(40)
        .collect();
    if snippet.trim().is_empty() {
        format!("syntax error at line {line}, column {column}")
    } else {
        format!("syntax error at line {line}, column {column}: unexpected '{}'", snippet.trim())
    }
}
