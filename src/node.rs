//! The [`Node`] contract and its `FunctionNode`/`RoutingNode`/`LoopNode`
//! variants (§4.2).
//!
//! Generalized from the teacher's `Node` trait (`run(snapshot, ctx) ->
//! NodePartial`) to the spec's `execute(payload, context) -> NodeOutcome`
//! shape: a plain payload for function-like nodes, a [`Routing`] decision for
//! routing-like nodes.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::NodeError;
use crate::resolver::{InputBinding, OutputBinding};
use crate::routing::Routing;
use crate::types::NodeId;

/// What a node produced from one `execute` call.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Payload(Value),
    Routing(Routing),
}

/// Structural introspection of a node, returned by [`Node::describe`].
///
/// Carried forward from the original Python source's `Node.describe()`
/// (§10.5 of the expanded spec) — useful for the compiler's own diagnostics
/// and for tests asserting graph shape.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeDescriptor {
    pub name: String,
    pub type_name: &'static str,
    pub default_route: Option<String>,
}

/// The execution contract every node implements.
///
/// Nodes are created once per flow and reused across invocations (§3
/// "Lifecycle"); `execute` is the only runtime entry point the scheduler
/// calls, mirroring the teacher's one-trait-method `Node::run`.
#[async_trait]
pub trait Node: Send + Sync {
    /// Runs this node against its resolved input payload and the shared
    /// context. Nodes must not call each other; all coordination happens
    /// through the context and the scheduler.
    async fn execute(&self, payload: Value, ctx: &mut Context) -> Result<NodeOutcome, NodeError>;

    /// A human-readable description of this node's shape, for diagnostics.
    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor {
            name: std::any::type_name::<Self>().to_string(),
            type_name: "node",
            default_route: None,
        }
    }
}

/// Per-node identity assigned once at graph-build time.
///
/// `bind` is idempotent when rebinding to the same id (§4.2); rebinding to a
/// different id is a configuration error. Wraps a node implementation so the
/// binding rule can be enforced uniformly regardless of which `Node` variant
/// is used.
pub struct BoundNode {
    id: OnceLock<NodeId>,
    inner: Arc<dyn Node>,
}

impl BoundNode {
    pub fn new(inner: Arc<dyn Node>) -> Self {
        Self {
            id: OnceLock::new(),
            inner,
        }
    }

    pub fn bind(&self, id: NodeId) -> Result<(), NodeError> {
        match self.id.get() {
            None => {
                let _ = self.id.set(id);
                Ok(())
            }
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(NodeError::Other(format!(
                "node already bound to `{existing}`, cannot rebind to `{id}`"
            ))),
        }
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        self.id.get()
    }

    pub fn inner(&self) -> &Arc<dyn Node> {
        &self.inner
    }
}

/// A callable of signature `fn(Value, &mut Context) -> Result<Value, NodeError>`,
/// resolved from context the way §4.3 describes (`context.inputs.callable`).
pub type Callable = Arc<dyn Fn(Value, &mut Context) -> Result<Value, NodeError> + Send + Sync>;

/// Wraps a callable, its input binding, and its output binding (§4.2
/// "FunctionNode"). Returning a [`NodeOutcome::Routing`] from the wrapped
/// callable is never possible by construction — the callable returns a bare
/// `Value` — so the "routing from a function slot" configuration error
/// (§9's Open Question) is instead raised by the scheduler for any node
/// registered as function-kind whose underlying implementation misbehaves.
pub struct FunctionNode {
    callable: Callable,
    input_binding: Option<InputBinding>,
    output_binding: Option<OutputBinding>,
}

impl FunctionNode {
    pub fn new(callable: Callable) -> Self {
        Self {
            callable,
            input_binding: None,
            output_binding: None,
        }
    }

    #[must_use]
    pub fn with_input(mut self, binding: InputBinding) -> Self {
        self.input_binding = Some(binding);
        self
    }

    #[must_use]
    pub fn with_output(mut self, binding: OutputBinding) -> Self {
        self.output_binding = Some(binding);
        self
    }
}

#[async_trait]
impl Node for FunctionNode {
    async fn execute(&self, payload: Value, ctx: &mut Context) -> Result<NodeOutcome, NodeError> {
        let resolved = match &self.input_binding {
            Some(binding) => binding
                .resolve(ctx)
                .map_err(|e| NodeError::Other(e.to_string()))?,
            None => payload,
        };
        let result = (self.callable)(resolved, ctx)?;
        if let Some(binding) = &self.output_binding {
            binding
                .apply(ctx, &result)
                .map_err(|e| NodeError::Other(e.to_string()))?;
        }
        Ok(NodeOutcome::Payload(result))
    }

    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor {
            name: "FunctionNode".to_string(),
            type_name: "function",
            default_route: None,
        }
    }
}

/// A routing predicate of signature `fn(Value, &Context) -> Routing`
/// (§4.2 "RoutingNode").
pub type RoutingFn = Arc<dyn Fn(Value, &Context) -> Routing + Send + Sync>;

/// Produces a [`Routing`] decision, never a payload.
pub struct RoutingNode {
    predicate: RoutingFn,
}

impl RoutingNode {
    pub fn new(predicate: RoutingFn) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl Node for RoutingNode {
    async fn execute(&self, payload: Value, ctx: &mut Context) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Routing((self.predicate)(payload, ctx)))
    }

    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor {
            name: "RoutingNode".to_string(),
            type_name: "routing",
            default_route: None,
        }
    }
}

/// Iterates a sequence by re-entering itself via a self-edge (§4.2
/// "LoopNode"). Internal cursor state is stored in the context under a
/// reserved per-node slot rather than in the node itself, since nodes are
/// reused across invocations.
pub struct LoopNode {
    items_path: String,
    loop_route: NodeId,
    body_route: NodeId,
}

impl LoopNode {
    pub fn new(items_path: impl Into<String>, loop_route: NodeId, body_route: NodeId) -> Self {
        Self {
            items_path: items_path.into(),
            loop_route,
            body_route,
        }
    }

    fn slot_path(&self) -> String {
        format!("$.__loop.{}", self.items_path.replace(['.', '$'], "_"))
    }
}

#[async_trait]
impl Node for LoopNode {
    async fn execute(&self, _payload: Value, ctx: &mut Context) -> Result<NodeOutcome, NodeError> {
        use crate::resolver::{read_path, write_path};

        let slot = self.slot_path();
        let cursor_path = format!("{slot}.cursor");
        let items_path = format!("{slot}.items");

        let items_loaded = read_path(ctx, &items_path).map_err(|e| NodeError::Other(e.to_string()))?;
        if items_loaded.is_null() {
            let items = read_path(ctx, &self.items_path).map_err(|e| NodeError::Other(e.to_string()))?;
            write_path(ctx, &items_path, items).map_err(|e| NodeError::Other(e.to_string()))?;
            write_path(ctx, &cursor_path, Value::from(0)).map_err(|e| NodeError::Other(e.to_string()))?;
        }

        let items = read_path(ctx, &items_path).map_err(|e| NodeError::Other(e.to_string()))?;
        let cursor = read_path(ctx, &cursor_path)
            .map_err(|e| NodeError::Other(e.to_string()))?
            .as_u64()
            .unwrap_or(0) as usize;

        let array = items.as_array().cloned().unwrap_or_default();
        if cursor >= array.len() {
            write_path(ctx, &cursor_path, Value::Null).map_err(|e| NodeError::Other(e.to_string()))?;
            write_path(ctx, &items_path, Value::Null).map_err(|e| NodeError::Other(e.to_string()))?;
            return Ok(NodeOutcome::Routing(Routing::to(self.loop_route.as_str())));
        }

        let item = array[cursor].clone();
        write_path(ctx, &cursor_path, Value::from((cursor + 1) as u64))
            .map_err(|e| NodeError::Other(e.to_string()))?;

        let out = serde_json::json!({ "item": item, "index": cursor });
        ctx.set_payload(
            &NodeId::new_unchecked(self.body_route.as_str()),
            out.clone(),
        );
        Ok(NodeOutcome::Routing(Routing::to(self.body_route.as_str())))
    }

    fn describe(&self) -> NodeDescriptor {
        NodeDescriptor {
            name: "LoopNode".to_string(),
            type_name: "loop",
            default_route: Some(self.loop_route.to_string()),
        }
    }
}
