//! The [`Routing`] value a node returns to select its successors.
//!
//! Kept as data written into the context rather than control flow, per
//! Design Notes §9 ("Routing as data, not control flow") — so a run can be
//! audited or replayed from `context.routing` alone.

use serde::{Deserialize, Serialize};

/// A target set selected by a routing-producing node.
///
/// `target = None` stops the branch; `One` selects a single successor;
/// `Many` fans out to several. Grounded on the `Routing` dataclass in the
/// original Python source (`target: Optional[Union[str, Sequence[str]]]`),
/// split into an explicit enum so Rust call sites don't need to distinguish
/// "one string" from "a list of one string" by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Routing {
    pub target: RoutingTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RoutingTarget {
    Stop,
    One(String),
    Many(Vec<String>),
}

impl Routing {
    /// Terminates this branch (`target = null`).
    #[must_use]
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            target: RoutingTarget::Stop,
            confidence: None,
            reason: Some(reason.into()),
        }
    }

    /// Selects a single successor.
    #[must_use]
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: RoutingTarget::One(target.into()),
            confidence: None,
            reason: None,
        }
    }

    /// Fans out to multiple successors.
    #[must_use]
    pub fn fan_out(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            target: RoutingTarget::Many(targets.into_iter().map(Into::into).collect()),
            confidence: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_confidence(mut self, confidence: i64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Flattens the target into a list of selected node-id strings, empty
    /// when the routing stops the branch.
    #[must_use]
    pub fn selected(&self) -> Vec<String> {
        match &self.target {
            RoutingTarget::Stop => Vec::new(),
            RoutingTarget::One(id) => vec![id.clone()],
            RoutingTarget::Many(ids) => ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_has_no_selected_targets() {
        assert!(Routing::stop("threshold").selected().is_empty());
    }

    #[test]
    fn single_target_selected() {
        assert_eq!(Routing::to("approve").selected(), vec!["approve".to_string()]);
    }

    #[test]
    fn fan_out_selected_in_order() {
        let r = Routing::fan_out(["geo", "risk"]);
        assert_eq!(r.selected(), vec!["geo".to_string(), "risk".to_string()]);
    }

    #[test]
    fn serde_round_trip() {
        let r = Routing::to("approve").with_confidence(85).with_reason("score");
        let json = serde_json::to_string(&r).unwrap();
        let back: Routing = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
