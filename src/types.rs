//! Core identifier types shared across the flow engine.
//!
//! `NodeId` is the one domain concept every other module keys off of: the
//! graph compiler, the scheduler's ready queue and join buffers, the
//! resolver's `payloads`/`routing`/`joins` maps, and the tracer's span
//! attributes all use it as the stable handle for "which node".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a compiled flow.
///
/// Node ids are plain strings matching `[A-Za-z_][A-Za-z0-9_]*` (the id
/// grammar used by the edge mini-language, see [`crate::graph::edges`]); the
/// type exists so call sites read as domain concepts rather than bare
/// `String`s, and so identifier validation happens in one place.
///
/// # Examples
///
/// ```rust
/// use flowcore::types::NodeId;
///
/// let classify = NodeId::new("classify").unwrap();
/// assert_eq!(classify.as_str(), "classify");
/// assert!(NodeId::new("2bad").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Builds a `NodeId`, rejecting strings that don't match the id grammar.
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidNodeId> {
        let raw = raw.into();
        if is_valid_id(&raw) {
            Ok(Self(raw))
        } else {
            Err(InvalidNodeId(raw))
        }
    }

    /// Builds a `NodeId` without validating the grammar.
    ///
    /// Used internally once a string has already passed through the edge
    /// parser or a prior `NodeId::new` call, to avoid re-validating on every
    /// clone of an already-trusted identifier.
    pub(crate) fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

fn is_valid_id(raw: &str) -> bool {
    let mut chars = raw.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A string was used as a node id but doesn't match `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id `{0}`: must match [A-Za-z_][A-Za-z0-9_]*")]
pub struct InvalidNodeId(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_ids() {
        assert!(NodeId::new("classify").is_ok());
        assert!(NodeId::new("_hidden").is_ok());
        assert!(NodeId::new("Node_2").is_ok());
    }

    #[test]
    fn rejects_invalid_ids() {
        assert!(NodeId::new("2node").is_err());
        assert!(NodeId::new("has-dash").is_err());
        assert!(NodeId::new("").is_err());
    }

    #[test]
    fn display_matches_inner_string() {
        let id = NodeId::new("merge").unwrap();
        assert_eq!(id.to_string(), "merge");
        assert_eq!(id.as_str(), "merge");
    }
}
