//! The shared mutable [`Context`] threaded through a flow invocation.
//!
//! Values stored in the context are `serde_json::Value` — the tagged
//! null/bool/number/string/array/object variant Design Notes §9 calls for in
//! a statically typed implementation, already depended on by this crate for
//! every other serialization need.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorEvent;
use crate::routing::Routing;
use crate::types::NodeId;

/// A single entry in the reserved `steps` sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub node_id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `status ∈ {start, success, failed, continue, goto}` per spec.md §3.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Start,
    Success,
    Failed,
    Continue,
    Goto,
}

impl StepRecord {
    pub fn new(node_id: impl Into<String>, status: StepStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The shared mapping threaded through one flow invocation.
///
/// Reserved keys (`steps`, `payloads`, `routing`, `joins`, `errors`,
/// `failed_node_id`, `failed_exception_type`, `failed_message`) are modeled
/// as typed fields so the scheduler and policy engine can mutate them without
/// re-parsing JSON on every step; everything else (`agents`, `metrics`,
/// user-declared `data.*` buckets) lives in `data`, a generic JSON object
/// nodes reach through the resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    pub steps: Vec<StepRecord>,
    pub payloads: Map<String, Value>,
    pub routing: Map<String, Value>,
    pub joins: Map<String, Value>,
    pub errors: Vec<ErrorEvent>,
    pub failed_node_id: Option<String>,
    pub failed_exception_type: Option<String>,
    pub failed_message: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Context {
    /// An empty context with all reserved keys initialized, per spec.md §3's
    /// invariant that reserved keys exist before the first node runs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `payloads[entry] = user_input`, per scheduler step 1 (§4.5).
    pub fn seed_entry(&mut self, entry: &NodeId, user_input: Value) {
        self.payloads.insert(entry.as_str().to_string(), user_input);
    }

    pub fn payload(&self, node: &NodeId) -> Option<&Value> {
        self.payloads.get(node.as_str())
    }

    pub fn set_payload(&mut self, node: &NodeId, value: Value) {
        self.payloads.insert(node.as_str().to_string(), value);
    }

    pub fn push_step(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    /// Records a routing decision produced by `node`, appending to the
    /// ordered sequence kept under `routing[node]`.
    pub fn push_routing(&mut self, node: &NodeId, routing: &Routing) {
        let entry = self
            .routing
            .entry(node.as_str().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(serde_json::to_value(routing).unwrap_or(Value::Null));
        }
    }

    /// Records a terminal node failure in the `errors`/`failed_*` keys, per
    /// §7's propagation policy: "the scheduler always records the failure
    /// ... before surfacing."
    pub fn record_failure(&mut self, node: &NodeId, exception: &str, event: ErrorEvent) {
        self.failed_node_id = Some(node.as_str().to_string());
        self.failed_exception_type = Some(exception.to_string());
        self.failed_message = Some(event.error.message.clone());
        self.errors.push(event);
    }

    /// Stashes a join input for `target`, contributed by `parent`. Returns
    /// the current number of buffered parents once inserted.
    pub fn stash_join_input(&mut self, target: &NodeId, parent: &NodeId, value: Value) -> usize {
        let bucket = self
            .joins
            .entry(target.as_str().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = bucket {
            map.insert(parent.as_str().to_string(), value);
            map.len()
        } else {
            0
        }
    }

    /// Reads back the buffered join inputs for `target`, if any have been
    /// stashed yet.
    pub fn join_inputs(&self, target: &NodeId) -> Option<&Map<String, Value>> {
        match self.joins.get(target.as_str()) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// Fluent constructor for a [`Context`] pre-seeded with an entry payload,
/// mirroring the teacher's `VersionedStateBuilder` convenience constructors.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    context: Context,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            context: Context::new(),
        }
    }

    #[must_use]
    pub fn with_entry(mut self, entry: &NodeId, user_input: Value) -> Self {
        self.context.seed_entry(entry, user_input);
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.data.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Context {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_context_has_empty_reserved_keys() {
        let ctx = Context::new();
        assert!(ctx.steps.is_empty());
        assert!(ctx.payloads.is_empty());
        assert!(ctx.errors.is_empty());
        assert!(ctx.failed_node_id.is_none());
    }

    #[test]
    fn seed_entry_sets_payload() {
        let mut ctx = Context::new();
        let entry = NodeId::new("A").unwrap();
        ctx.seed_entry(&entry, json!({"customer_id": 42}));
        assert_eq!(ctx.payload(&entry), Some(&json!({"customer_id": 42})));
    }

    #[test]
    fn join_buffer_accumulates_in_insertion_order_of_keys() {
        let mut ctx = Context::new();
        let merge = NodeId::new("merge").unwrap();
        let geo = NodeId::new("geo").unwrap();
        let risk = NodeId::new("risk").unwrap();
        ctx.stash_join_input(&merge, &geo, json!({"country": "JP"}));
        let count = ctx.stash_join_input(&merge, &risk, json!({"score": 0.2}));
        assert_eq!(count, 2);
        let joined = ctx.join_inputs(&merge).unwrap();
        assert_eq!(joined.get("geo"), Some(&json!({"country": "JP"})));
        assert_eq!(joined.get("risk"), Some(&json!({"score": 0.2})));
    }

    #[test]
    fn record_failure_sets_shortcuts() {
        let mut ctx = Context::new();
        let node = NodeId::new("primary").unwrap();
        let event = ErrorEvent::node("primary", "ProviderError", crate::error::LadderError::msg("boom"));
        ctx.record_failure(&node, "ProviderError", event);
        assert_eq!(ctx.failed_node_id.as_deref(), Some("primary"));
        assert_eq!(ctx.failed_exception_type.as_deref(), Some("ProviderError"));
        assert_eq!(ctx.errors.len(), 1);
    }
}
