//! Fluent builder for assembling a flow before compilation (§3, §4.3).

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::node::Node;
use crate::policy::PolicyOverride;
use crate::types::NodeId;

use super::compile::compile_graph;
use super::Graph;
use crate::error::GraphCompileError;

/// Accumulates nodes, edges, the entry point, and per-node policy overrides
/// before [`GraphBuilder::compile`] validates and freezes them into a
/// [`Graph`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<NodeId, Arc<dyn Node>>,
    edges: Vec<(NodeId, NodeId)>,
    join_edges: Vec<(Vec<NodeId>, NodeId)>,
    entry: Option<NodeId>,
    default_routes: FxHashMap<NodeId, NodeId>,
    policy_overrides: FxHashMap<NodeId, PolicyOverride>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node implementation under `id`.
    #[must_use]
    pub fn add_node(mut self, id: NodeId, node: impl Node + 'static) -> Self {
        self.nodes.insert(id, Arc::new(node));
        self
    }

    /// Registers an already-constructed node implementation under `id`,
    /// used when nodes are instantiated indirectly (e.g. from a
    /// [`crate::registry::NodeRegistry`]) rather than written inline.
    #[must_use]
    pub fn add_node_arc(mut self, id: NodeId, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(id, node);
        self
    }

    /// Adds a plain `from -> to` edge.
    #[must_use]
    pub fn add_edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.push((from, to));
        self
    }

    /// Adds a join edge: `to` becomes ready only once every node in `from`
    /// has completed (§4.5 "join buffers").
    #[must_use]
    pub fn add_join_edge(mut self, from: Vec<NodeId>, to: NodeId) -> Self {
        self.join_edges.push((from, to));
        self
    }

    /// Parses and adds every edge statement in `expr` (the `A >> (B|C)` /
    /// `(A & B) >> C` mini-language). `&` on the right of `>>` (e.g.
    /// `A >> (B & C)`) is accepted as a plain fan-out, equivalent to `|`.
    pub fn add_edge_expr(mut self, expr: &str) -> Result<Self, GraphCompileError> {
        use super::edges::{parse_edge_expr, GroupKind};

        for stmt in parse_edge_expr(expr)? {
            match (&stmt.from, &stmt.to) {
                (GroupKind::All(parents), GroupKind::Either(targets)) => {
                    for target in targets {
                        self.join_edges.push((parents.clone(), target.clone()));
                    }
                }
                (GroupKind::Either(froms), GroupKind::Either(tos)) => {
                    for from in froms {
                        for to in tos {
                            self.edges.push((from.clone(), to.clone()));
                        }
                    }
                }
                // `&` on the right of `>>` is equivalent to `|` (a plain
                // fan-out), per §4.3: "A >> (B & C) ... is equivalent to
                // A >> (B | C)".
                (GroupKind::All(parents), GroupKind::All(targets)) => {
                    for target in targets {
                        self.join_edges.push((parents.clone(), target.clone()));
                    }
                }
                (GroupKind::Either(froms), GroupKind::All(targets)) => {
                    for from in froms {
                        for target in targets {
                            self.edges.push((from.clone(), target.clone()));
                        }
                    }
                }
            }
        }
        Ok(self)
    }

    /// Declares the graph's single entry node (§3 "entry").
    #[must_use]
    pub fn with_entry(mut self, entry: NodeId) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Declares `node`'s `default_route`, used when a function-style node
    /// returns a bare payload rather than an explicit [`crate::routing::Routing`].
    #[must_use]
    pub fn with_default_route(mut self, node: NodeId, target: NodeId) -> Self {
        self.default_routes.insert(node, target);
        self
    }

    /// Attaches a per-node policy override, merged on top of the runtime's
    /// default policy at execution time (§4.4).
    #[must_use]
    pub fn with_policy_override(mut self, node: NodeId, policy: PolicyOverride) -> Self {
        self.policy_overrides.insert(node, policy);
        self
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validates and compiles this builder into an executable [`Graph`].
    pub fn compile(self) -> Result<Graph, GraphCompileError> {
        compile_graph(
            self.nodes,
            self.edges,
            self.join_edges,
            self.entry,
            self.default_routes,
            self.policy_overrides,
        )
    }
}
