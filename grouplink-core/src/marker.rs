//! The group marker convention.
//!
//! A synced Registry A group carries a marker in its free-text `source`
//! field:
//!
//! ```text
//! synced-group        flagged for sync, counterpart not created yet
//! synced-group-<N>    linked to Registry B group N
//! ```
//!
//! The format is shared with existing registry data and must stay
//! bit-exact.

use std::fmt;

use thiserror::Error;

use crate::types::PlatformGroupId;

/// Literal marking a group as synced.
pub const MARKER: &str = "synced-group";

/// Prefix that precedes the counterpart id.
pub const LINK_PREFIX: &str = "synced-group-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMarker {
    Pending,
    Linked(PlatformGroupId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    #[error("source '{0}' carries no sync marker")]
    Absent(String),

    #[error("malformed sync marker '{0}'")]
    Malformed(String),
}

impl GroupMarker {
    /// Parse a group's `source` field.
    pub fn parse(source: &str) -> Result<Self, MarkerError> {
        let trimmed = source.trim();
        if trimmed == MARKER {
            return Ok(GroupMarker::Pending);
        }
        let Some((_, remainder)) = trimmed.split_once(LINK_PREFIX) else {
            return Err(if trimmed.contains(MARKER) {
                MarkerError::Malformed(source.to_owned())
            } else {
                MarkerError::Absent(source.to_owned())
            });
        };
        remainder
            .trim()
            .parse::<u64>()
            .map(|id| GroupMarker::Linked(PlatformGroupId(id)))
            .map_err(|_| MarkerError::Malformed(source.to_owned()))
    }

    pub fn linked(self) -> Option<PlatformGroupId> {
        match self {
            GroupMarker::Linked(id) => Some(id),
            GroupMarker::Pending => None,
        }
    }
}

impl fmt::Display for GroupMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMarker::Pending => f.write_str(MARKER),
            GroupMarker::Linked(id) => write!(f, "{LINK_PREFIX}{id}"),
        }
    }
}

/// True when a `source` value would be matched by the synced-groups query.
pub fn is_synced_source(source: &str) -> bool {
    source.contains(MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("synced-group", GroupMarker::Pending)]
    #[case("synced-group-12", GroupMarker::Linked(PlatformGroupId(12)))]
    #[case("  synced-group-7 ", GroupMarker::Linked(PlatformGroupId(7)))]
    #[case("import synced-group-3", GroupMarker::Linked(PlatformGroupId(3)))]
    fn parses_valid_markers(#[case] source: &str, #[case] expected: GroupMarker) {
        assert_eq!(GroupMarker::parse(source), Ok(expected));
    }

    #[rstest]
    #[case("synced-group-")]
    #[case("synced-group-abc")]
    #[case("synced-group-12abc")]
    #[case("synced-groups")]
    fn rejects_malformed_markers(#[case] source: &str) {
        assert!(matches!(
            GroupMarker::parse(source),
            Err(MarkerError::Malformed(_))
        ));
    }

    #[test]
    fn plain_sources_are_absent_not_malformed() {
        assert!(matches!(
            GroupMarker::parse("Imported from CSV"),
            Err(MarkerError::Absent(_))
        ));
        assert!(!is_synced_source("Imported from CSV"));
    }

    #[test]
    fn display_is_bit_exact() {
        assert_eq!(GroupMarker::Pending.to_string(), "synced-group");
        assert_eq!(
            GroupMarker::Linked(PlatformGroupId(904)).to_string(),
            "synced-group-904"
        );
    }
}
