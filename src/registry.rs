//! String-keyed node-type registry (§4.3 "Node instantiation").
//!
//! Generalized from the teacher's `ReducerRegistry`
//! (`FxHashMap` keyed lookup, fluent `register`/`with_*` builder) to a
//! registry of node constructors: the scheduler and graph compiler never see
//! a concrete node type, only whatever string `type` a declarative config
//! names. Populated once at process init and read-only afterward (§3
//! "the node registry is process-wide and read-only after initialization").

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::GraphCompileError;
use crate::node::Node;
use crate::types::NodeId;

/// Builds one node instance from its declarative `setting` value.
///
/// `setting` is preserved verbatim from the config and typed by convention
/// `{type, value}` pairs; the factory decides how to interpret it (§4.3).
pub type NodeFactory = Arc<dyn Fn(Value) -> Result<Arc<dyn Node>, GraphCompileError> + Send + Sync>;

/// Maps a node-type name to the factory that constructs it.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    factories: FxHashMap<String, NodeFactory>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory for `type_name`. A later registration for the
    /// same name replaces the earlier one.
    pub fn register(&mut self, type_name: impl Into<String>, factory: NodeFactory) -> &mut Self {
        self.factories.insert(type_name.into(), factory);
        self
    }

    /// Builder-style variant of [`NodeRegistry::register`].
    #[must_use]
    pub fn with_node_type(mut self, type_name: impl Into<String>, factory: NodeFactory) -> Self {
        self.register(type_name, factory);
        self
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Constructs `node`'s implementation from its declared `type_name` and
    /// `setting`. Fails with [`GraphCompileError::UnknownNodeType`] naming
    /// both the node and the missing type, per §4.3.
    pub fn instantiate(
        &self,
        node: &NodeId,
        type_name: &str,
        setting: Value,
    ) -> Result<Arc<dyn Node>, GraphCompileError> {
        match self.factories.get(type_name) {
            Some(factory) => factory(setting),
            None => Err(GraphCompileError::UnknownNodeType {
                node: node.clone(),
                type_name: type_name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FunctionNode;
    use serde_json::json;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[test]
    fn registers_and_instantiates_a_type() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "passthrough",
            Arc::new(|_setting| Ok(Arc::new(FunctionNode::new(Arc::new(|p, _ctx| Ok(p)))) as Arc<dyn Node>)),
        );
        assert!(registry.contains("passthrough"));
        let node = registry.instantiate(&id("a"), "passthrough", json!({}));
        assert!(node.is_ok());
    }

    #[test]
    fn unknown_type_names_the_missing_node_and_type() {
        let registry = NodeRegistry::new();
        let err = registry
            .instantiate(&id("classify"), "llm_router", json!({}))
            .unwrap_err();
        match err {
            GraphCompileError::UnknownNodeType { node, type_name } => {
                assert_eq!(node.as_str(), "classify");
                assert_eq!(type_name, "llm_router");
            }
            other => panic!("expected UnknownNodeType, got {other:?}"),
        }
    }

    #[test]
    fn re_registering_a_type_replaces_the_factory() {
        let mut registry = NodeRegistry::new();
        registry.register(
            "echo",
            Arc::new(|_setting| Ok(Arc::new(FunctionNode::new(Arc::new(|_p, _ctx| Ok(json!(1))))) as Arc<dyn Node>)),
        );
        registry.register(
            "echo",
            Arc::new(|_setting| Ok(Arc::new(FunctionNode::new(Arc::new(|_p, _ctx| Ok(json!(2))))) as Arc<dyn Node>)),
        );
        assert_eq!(registry.factories.len(), 1);
    }
}
