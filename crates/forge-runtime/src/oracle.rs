//! Validator Oracle Adapter
//!
//! Decides whether an execution's table matches a reference table. Equality
//! is structural and value-based: the same column set, the same row count
//! and equal cells in the same row order. Column order is ignored unless
//! asked for, and numbers compare by value regardless of how they were typed.

use std::collections::BTreeSet;
use std::fmt;

use forge_artifact::{Cell, Table};
use serde::{Deserialize, Serialize};

/// Knobs for [`compare`]. All off by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    /// Require columns in the same order
    pub strict_column_order: bool,
    /// Absolute tolerance for numeric cells
    pub numeric_tolerance: Option<f64>,
    /// Ignore leading/trailing whitespace in text cells
    pub trim_text: bool,
}

impl CompareOptions {
    /// Enable strict column order
    #[must_use]
    pub fn with_strict_column_order(mut self) -> Self {
        self.strict_column_order = true;
        self
    }

    /// Compare numbers within `tolerance`
    #[must_use]
    pub fn with_numeric_tolerance(mut self, tolerance: f64) -> Self {
        self.numeric_tolerance = Some(tolerance);
        self
    }

    /// Trim text before comparing
    #[must_use]
    pub fn with_trim_text(mut self) -> Self {
        self.trim_text = true;
        self
    }
}

/// Oracle verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    Match,
    /// The tables differ; the message describes the first difference
    Mismatch(String),
}

impl Comparison {
    /// Whether the tables matched
    #[inline]
    #[must_use]
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => f.write_str("match"),
            Self::Mismatch(diff) => write!(f, "mismatch: {diff}"),
        }
    }
}

/// Compare `actual` against `expected`. Pure.
#[must_use]
pub fn compare(actual: &Table, expected: &Table, options: &CompareOptions) -> Comparison {
    if let Some(diff) = column_difference(actual, expected, options) {
        return Comparison::Mismatch(diff);
    }
    if actual.row_count() != expected.row_count() {
        return Comparison::Mismatch(format!(
            "row count differs: expected {}, got {}",
            expected.row_count(),
            actual.row_count()
        ));
    }

    // expected columns aligned to actual by name; the set check above guarantees a hit
    let alignment: Vec<(usize, usize)> = actual
        .columns
        .iter()
        .enumerate()
        .filter_map(|(a, name)| expected.column_index(name).map(|e| (a, e)))
        .collect();

    let mut first: Option<String> = None;
    let mut differing = 0usize;
    for (row, (actual_row, expected_row)) in actual.rows.iter().zip(&expected.rows).enumerate() {
        for &(a, e) in &alignment {
            let (Some(got), Some(want)) = (actual_row.get(a), expected_row.get(e)) else {
                continue;
            };
            if !cells_equal(got, want, options) {
                differing += 1;
                if first.is_none() {
                    first = Some(format!(
                        "row {row}, column '{}': expected {}, got {}",
                        actual.columns[a],
                        describe(want),
                        describe(got)
                    ));
                }
            }
        }
    }

    match first {
        None => Comparison::Match,
        Some(first) => {
            let total = actual.row_count() * alignment.len();
            Comparison::Mismatch(format!("{differing} of {total} cells differ; first at {first}"))
        }
    }
}

fn column_difference(actual: &Table, expected: &Table, options: &CompareOptions) -> Option<String> {
    let have: BTreeSet<&str> = actual.columns.iter().map(String::as_str).collect();
    let want: BTreeSet<&str> = expected.columns.iter().map(String::as_str).collect();
    if have != want {
        let missing: Vec<&str> = want.difference(&have).copied().collect();
        let unexpected: Vec<&str> = have.difference(&want).copied().collect();
        return Some(format!(
            "columns differ: missing {missing:?}, unexpected {unexpected:?}"
        ));
    }
    if options.strict_column_order && actual.columns != expected.columns {
        return Some(format!(
            "column order differs: expected {:?}, got {:?}",
            expected.columns, actual.columns
        ));
    }
    None
}

fn cells_equal(got: &Cell, want: &Cell, options: &CompareOptions) -> bool {
    match (got, want) {
        (Cell::Null, Cell::Null) => true,
        (Cell::Bool(a), Cell::Bool(b)) => a == b,
        (Cell::Number(a), Cell::Number(b)) => match options.numeric_tolerance {
            Some(tolerance) => (a - b).abs() <= tolerance,
            None => a == b,
        },
        (Cell::Text(a), Cell::Text(b)) if options.trim_text => a.trim() == b.trim(),
        (Cell::Text(a), Cell::Text(b)) => a == b,
        _ => false,
    }
}

fn describe(cell: &Cell) -> String {
    match cell {
        Cell::Null => "null".to_string(),
        Cell::Text(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}
