//! Target identifiers
//!
//! A [`Target`] names a class of documents that share one extraction
//! artifact (for example a bank's statement layout: `sbi`, `icici`).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length of a target identifier
pub const MAX_TARGET_LEN: usize = 64;

/// Validated, stable target identifier
///
/// Stored lowercase. Only ASCII alphanumerics, `_` and `-` are accepted, so a
/// target maps to a file name without escaping and two distinct targets never
/// map to the same location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target(String);

impl Target {
    /// Parse and validate a target identifier
    ///
    /// # Errors
    /// Returns error if the identifier is empty, too long or contains
    /// characters outside `[A-Za-z0-9_-]`
    pub fn new(raw: impl AsRef<str>) -> Result<Self, TargetError> {
        raw.as_ref().parse()
    }

    /// Identifier as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the artifact unit for this target
    #[inline]
    #[must_use]
    pub fn artifact_file_name(&self) -> String {
        format!("{}{}", self.0, ARTIFACT_SUFFIX)
    }

    /// Recover a target from an artifact file name (`sbi_parser.py` → `sbi`)
    #[must_use]
    pub fn from_artifact_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(ARTIFACT_SUFFIX)
            .and_then(|stem| stem.parse().ok())
    }
}

/// Suffix shared by every persisted artifact file
pub const ARTIFACT_SUFFIX: &str = "_parser.py";

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::Empty);
        }
        if s.len() > MAX_TARGET_LEN {
            return Err(TargetError::TooLong {
                len: s.len(),
                max: MAX_TARGET_LEN,
            });
        }
        if let Some(c) = s
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
        {
            return Err(TargetError::InvalidChar {
                target: s.to_string(),
                found: c,
            });
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.0
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors related to target identifiers
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    /// Empty identifier
    #[error("target identifier is empty")]
    Empty,

    /// Identifier exceeds the length limit
    #[error("target identifier is {len} chars long (max: {max})")]
    TooLong { len: usize, max: usize },

    /// Identifier contains a forbidden character
    #[error("invalid character {found:?} in target '{target}' (allowed: alphanumeric, '_', '-')")]
    InvalidChar { target: String, found: char },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn target_normalizes_case_and_whitespace() {
        let target: Target = "  SBI ".parse().unwrap();
        assert_eq!(target.as_str(), "sbi");
        assert_eq!(target.to_string(), "sbi");
    }

    #[test]
    fn target_rejects_path_characters() {
        assert!(matches!(
            Target::new("../etc"),
            Err(TargetError::InvalidChar { found: '.', .. })
        ));
        assert!(matches!(
            Target::new("a/b"),
            Err(TargetError::InvalidChar { found: '/', .. })
        ));
        assert_eq!(Target::new(""), Err(TargetError::Empty));
    }

    #[test]
    fn target_rejects_overlong() {
        let raw = "a".repeat(MAX_TARGET_LEN + 1);
        assert!(matches!(Target::new(raw), Err(TargetError::TooLong { .. })));
    }

    #[test]
    fn artifact_file_name_roundtrip() {
        let target = Target::new("icici").unwrap();
        assert_eq!(target.artifact_file_name(), "icici_parser.py");
        assert_eq!(
            Target::from_artifact_file_name("icici_parser.py"),
            Some(target)
        );
        assert_eq!(Target::from_artifact_file_name("icici.py"), None);
        assert_eq!(Target::from_artifact_file_name("_parser.py"), None);
    }

    #[test]
    fn target_serde_validates() {
        let ok: Target = serde_json::from_str("\"hdfc\"").unwrap();
        assert_eq!(ok.as_str(), "hdfc");
        assert!(serde_json::from_str::<Target>("\"no spaces\"").is_err());
    }

    proptest! {
        #[test]
        fn valid_targets_map_to_distinct_files(a in "[a-z0-9_-]{1,20}", b in "[a-z0-9_-]{1,20}") {
            let ta = Target::new(&a).unwrap();
            let tb = Target::new(&b).unwrap();
            prop_assert_eq!(ta == tb, ta.artifact_file_name() == tb.artifact_file_name());
        }
    }
}
