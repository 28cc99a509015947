//! Run identities
//!
//! Provides [`RunId`], the opaque token that addresses every artifact of one
//! pipeline execution.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Number of characters in the rendered form of a [`RunId`]
pub const RUN_ID_LEN: usize = 32;

/// Unique identity of a pipeline run
///
/// A 128-bit random token rendered as 32 lowercase hex characters. The
/// rendered form doubles as the run's directory name, so it never contains
/// path separators or dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId(Uuid);

impl RunId {
    /// Mint a fresh random identity
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short form (first 8 hex chars) for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RunId {
    type Err = RunIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != RUN_ID_LEN {
            return Err(RunIdError::InvalidLength {
                expected: RUN_ID_LEN,
                actual: s.len(),
            });
        }
        if !is_hex(s) {
            return Err(RunIdError::InvalidCharacter(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| RunIdError::InvalidCharacter(s.to_string()))
    }
}

impl serde::Serialize for RunId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RunId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Check that `s` is non-empty and only holds ASCII hex digits
#[inline]
#[must_use]
pub fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Errors parsing a [`RunId`]
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RunIdError {
    /// Wrong number of characters
    #[error("invalid run id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Non-hex character present
    #[error("run id must be hex: {0}")]
    InvalidCharacter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_renders_fixed_width_hex() {
        let id = RunId::new();
        let s = id.to_string();
        assert_eq!(s.len(), RUN_ID_LEN);
        assert!(is_hex(&s));
    }

    #[test]
    fn run_id_display_and_parse() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn run_ids_are_distinct() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn run_id_rejects_hyphenated_form() {
        let id = RunId::new();
        let hyphenated = id.as_uuid().hyphenated().to_string();
        assert!(matches!(
            hyphenated.parse::<RunId>(),
            Err(RunIdError::InvalidLength { .. })
        ));
    }

    #[test]
    fn run_id_rejects_path_characters() {
        let bad = "../../../../etc/passwd/aaaaaaaaa";
        assert_eq!(bad.len(), RUN_ID_LEN);
        assert!(matches!(
            bad.parse::<RunId>(),
            Err(RunIdError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn run_id_short() {
        let id = RunId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().starts_with(&id.short()));
    }

    #[test]
    fn is_hex_rejects_empty() {
        assert!(!is_hex(""));
        assert!(is_hex("deadBEEF"));
        assert!(!is_hex("dead/"));
    }
}
