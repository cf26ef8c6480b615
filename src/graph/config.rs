//! Builds a [`super::Graph`] from the declarative configuration mapping
//! described by §4.3: `{entry, nodes: {id -> {type, ...}}, edges}`. Mirrors
//! the teacher's pattern of a small serde-deserializable shape feeding a
//! builder, rather than hand-writing `GraphBuilder` calls.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::GraphCompileError;
use crate::node::RoutingNode;
use crate::policy::PolicyOverride;
use crate::registry::NodeRegistry;
use crate::resolver::{InputBinding, OutputBinding};
use crate::types::NodeId;

use super::{Graph, GraphBuilder};

/// `context.inputs`/`context.outputs` on one declared node (§4.3).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeContextConfig {
    pub inputs: Option<Value>,
    pub outputs: Option<Value>,
}

/// One entry of the `nodes` mapping in a declarative graph configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: Option<String>,
    #[serde(default)]
    pub context: NodeContextConfig,
    #[serde(default)]
    pub setting: Value,
    pub policy: Option<PolicyOverride>,
    pub default_route: Option<String>,
}

/// The full declarative graph configuration (§4.3): `{entry, nodes, edges}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub entry: String,
    pub nodes: FxHashMap<String, NodeConfig>,
    #[serde(default)]
    pub edges: Vec<String>,
}

/// The callable types that wrap registry-produced nodes with their input
/// and output bindings. The registry instantiates the underlying
/// implementation; `context.inputs.callable` (when present) is handed to the
/// factory as part of `setting`, per §4.3's "extracted and injected into
/// setting" rule.
fn inject_callable(mut setting: Value, inputs: &Option<Value>) -> Value {
    let Some(Value::Object(inputs_map)) = inputs else {
        return setting;
    };
    let Some(callable) = inputs_map.get("callable") else {
        return setting;
    };
    if !setting.is_object() {
        setting = Value::Object(serde_json::Map::new());
    }
    setting
        .as_object_mut()
        .expect("just ensured object")
        .insert("callable".to_string(), callable.clone());
    setting
}

/// A registry-built node wrapped with the input/output bindings its config
/// declared (§4.1, §4.3): resolves the input binding before delegating to
/// the inner node, then applies the output binding to a `Payload` result.
/// Routing results pass through untouched — a routing node's decision isn't
/// a mapping result to scatter.
struct BoundFunctionNode {
    inner: std::sync::Arc<dyn crate::node::Node>,
    input_binding: Option<InputBinding>,
    output_binding: Option<OutputBinding>,
}

#[async_trait::async_trait]
impl crate::node::Node for BoundFunctionNode {
    async fn execute(
        &self,
        payload: Value,
        ctx: &mut crate::context::Context,
    ) -> Result<crate::node::NodeOutcome, crate::error::NodeError> {
        let resolved = match &self.input_binding {
            Some(binding) => binding
                .resolve(ctx)
                .map_err(|e| crate::error::NodeError::Other(e.to_string()))?,
            None => payload,
        };
        let outcome = self.inner.execute(resolved, ctx).await?;
        if let crate::node::NodeOutcome::Payload(value) = &outcome {
            if let Some(binding) = &self.output_binding {
                binding
                    .apply(ctx, value)
                    .map_err(|e| crate::error::NodeError::Other(e.to_string()))?;
            }
        }
        Ok(outcome)
    }

    fn describe(&self) -> crate::node::NodeDescriptor {
        self.inner.describe()
    }
}

/// Wraps a registry-built node with the input/output bindings its config
/// declared; a no-op when neither binding is present.
fn apply_bindings(
    node_id: &NodeId,
    built: std::sync::Arc<dyn crate::node::Node>,
    cfg: &NodeConfig,
) -> Result<std::sync::Arc<dyn crate::node::Node>, GraphCompileError> {
    let input_binding = cfg
        .context
        .inputs
        .as_ref()
        .map(InputBinding::from_config)
        .transpose()
        .map_err(|e| GraphCompileError::BindingFailed {
            node: node_id.to_string(),
            reason: e.to_string(),
        })?;
    let output_binding = cfg
        .context
        .outputs
        .as_ref()
        .map(OutputBinding::from_config)
        .transpose()
        .map_err(|e| GraphCompileError::BindingFailed {
            node: node_id.to_string(),
            reason: e.to_string(),
        })?;

    if input_binding.is_none() && output_binding.is_none() {
        return Ok(built);
    }

    Ok(std::sync::Arc::new(BoundFunctionNode {
        inner: built,
        input_binding,
        output_binding,
    }))
}

/// Builds a compiled [`Graph`] from `config`, resolving each node's `type`
/// through `registry` (§4.3).
pub fn build_graph(config: &GraphConfig, registry: &NodeRegistry) -> Result<Graph, GraphCompileError> {
    let mut builder = GraphBuilder::new();

    for (id_str, cfg) in &config.nodes {
        let node_id = NodeId::new(id_str.clone())?;
        let setting = inject_callable(cfg.setting.clone(), &cfg.context.inputs);
        let built = registry.instantiate(&node_id, &cfg.type_name, setting)?;
        let built = apply_bindings(&node_id, built, cfg)?;
        builder = builder.add_node_arc(node_id.clone(), built);
        if let Some(target) = &cfg.default_route {
            builder = builder.with_default_route(node_id.clone(), NodeId::new(target.clone())?);
        }
        if let Some(policy) = &cfg.policy {
            builder = builder.with_policy_override(node_id, policy.clone());
        }
    }

    for expr in &config.edges {
        builder = builder.add_edge_expr(expr)?;
    }

    builder = builder.with_entry(NodeId::new(config.entry.clone())?);
    builder.compile()
}

/// A routing-node factory convenience, letting callers register routing
/// predicates the same way they register plain functions; kept here rather
/// than in [`crate::registry`] since it only matters for declarative
/// configs (programmatic graphs construct `RoutingNode` directly).
pub fn routing_factory(
    predicate: crate::node::RoutingFn,
) -> crate::registry::NodeFactory {
    std::sync::Arc::new(move |_setting| {
        Ok(std::sync::Arc::new(RoutingNode::new(predicate.clone())) as std::sync::Arc<dyn crate::node::Node>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{FunctionNode, NodeOutcome};
    use serde_json::json;
    use std::sync::Arc;

    fn passthrough_factory() -> crate::registry::NodeFactory {
        Arc::new(|_setting| {
            Ok(Arc::new(FunctionNode::new(Arc::new(|p, _ctx| Ok(p)))) as Arc<dyn crate::node::Node>)
        })
    }

    #[test]
    fn builds_a_linear_graph_from_config() {
        let mut registry = NodeRegistry::new();
        registry.register("passthrough", passthrough_factory());

        let config: GraphConfig = serde_json::from_value(json!({
            "entry": "a",
            "nodes": {
                "a": {"type": "passthrough"},
                "b": {"type": "passthrough"}
            },
            "edges": ["a >> b"]
        }))
        .unwrap();

        let graph = build_graph(&config, &registry).unwrap();
        assert_eq!(graph.node_ids().count(), 2);
    }

    #[test]
    fn unknown_type_fails_with_the_node_and_type_name() {
        let registry = NodeRegistry::new();
        let config: GraphConfig = serde_json::from_value(json!({
            "entry": "a",
            "nodes": { "a": {"type": "nonexistent"} },
            "edges": []
        }))
        .unwrap();

        let err = build_graph(&config, &registry).unwrap_err();
        match err {
            GraphCompileError::UnknownNodeType { type_name, .. } => {
                assert_eq!(type_name, "nonexistent");
            }
            other => panic!("expected UnknownNodeType, got {other:?}"),
        }
    }

    #[test]
    fn input_binding_from_context_is_applied() {
        let mut registry = NodeRegistry::new();
        registry.register("passthrough", passthrough_factory());

        let config: GraphConfig = serde_json::from_value(json!({
            "entry": "a",
            "nodes": {
                "a": {
                    "type": "passthrough",
                    "context": {"inputs": "$.x"}
                }
            },
            "edges": []
        }))
        .unwrap();

        let graph = build_graph(&config, &registry).unwrap();
        let node = graph.node(&NodeId::new("a").unwrap()).unwrap();
        assert_eq!(node.describe().type_name, "function");
        let _ = NodeOutcome::Payload(json!(null));
    }
}
