//! Validation and compilation of a [`super::builder::GraphBuilder`] into a
//! frozen, executable [`Graph`] (§4.3).

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::GraphCompileError;
use crate::node::Node;
use crate::policy::PolicyOverride;
use crate::types::NodeId;

/// A validated, immutable flow topology: the structure the scheduler drives
/// through §4.5's superstep loop.
///
/// `parent_counts`/`parent_order` are precomputed here rather than derived
/// at scheduling time, since every node's full parent set is known once the
/// graph is compiled and never changes during a run.
pub struct Graph {
    nodes: FxHashMap<NodeId, Arc<dyn Node>>,
    entry: NodeId,
    adjacency: FxHashMap<NodeId, Vec<NodeId>>,
    reverse: FxHashMap<NodeId, Vec<NodeId>>,
    parent_counts: FxHashMap<NodeId, usize>,
    /// Parent ids for each node, sorted for a deterministic join order
    /// regardless of the order edges were declared or completed in.
    parent_order: FxHashMap<NodeId, Vec<NodeId>>,
    default_routes: FxHashMap<NodeId, NodeId>,
    policy_overrides: FxHashMap<NodeId, PolicyOverride>,
}

static EMPTY: Vec<NodeId> = Vec::new();

impl Graph {
    pub fn entry(&self) -> &NodeId {
        &self.entry
    }

    pub fn node(&self, id: &NodeId) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn successors(&self, id: &NodeId) -> &[NodeId] {
        self.adjacency.get(id).map_or(EMPTY.as_slice(), Vec::as_slice)
    }

    pub fn predecessors(&self, id: &NodeId) -> &[NodeId] {
        self.reverse.get(id).map_or(EMPTY.as_slice(), Vec::as_slice)
    }

    pub fn parent_count(&self, id: &NodeId) -> usize {
        self.parent_counts.get(id).copied().unwrap_or(0)
    }

    pub fn parent_order(&self, id: &NodeId) -> &[NodeId] {
        self.parent_order.get(id).map_or(EMPTY.as_slice(), Vec::as_slice)
    }

    pub fn default_route(&self, id: &NodeId) -> Option<&NodeId> {
        self.default_routes.get(id)
    }

    pub fn policy_override(&self, id: &NodeId) -> Option<&PolicyOverride> {
        self.policy_overrides.get(id)
    }

    /// True when `target` is reachable from `source` via a declared edge
    /// (used by the scheduler to validate a node's runtime routing choice
    /// against its static topology, §4.5.1).
    pub fn is_declared_successor(&self, source: &NodeId, target: &NodeId) -> bool {
        self.successors(source).iter().any(|s| s == target)
    }
}

pub(super) fn compile_graph(
    nodes: FxHashMap<NodeId, Arc<dyn Node>>,
    edges: Vec<(NodeId, NodeId)>,
    join_edges: Vec<(Vec<NodeId>, NodeId)>,
    entry: Option<NodeId>,
    default_routes: FxHashMap<NodeId, NodeId>,
    policy_overrides: FxHashMap<NodeId, PolicyOverride>,
) -> Result<Graph, GraphCompileError> {
    let entry = entry.ok_or(GraphCompileError::MissingEntry)?;

    if !nodes.contains_key(&entry) {
        return Err(GraphCompileError::UnknownEntry(entry));
    }

    let mut adjacency: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    let mut reverse: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    let mut parent_order: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();

    let mut add_edge = |from: NodeId, to: NodeId| -> Result<(), GraphCompileError> {
        if !nodes.contains_key(&from) {
            return Err(GraphCompileError::UnknownEdgeEndpoint(from));
        }
        if !nodes.contains_key(&to) {
            return Err(GraphCompileError::UnknownEdgeEndpoint(to));
        }
        adjacency.entry(from.clone()).or_default().push(to.clone());
        reverse.entry(to.clone()).or_default().push(from.clone());
        parent_order.entry(to).or_default().push(from);
        Ok(())
    };

    for (from, to) in edges {
        add_edge(from, to)?;
    }
    for (parents, to) in join_edges {
        for parent in parents {
            add_edge(parent, to.clone())?;
        }
    }

    for parents in parent_order.values_mut() {
        parents.sort();
    }

    for (node, target) in &default_routes {
        if !nodes.contains_key(node) {
            return Err(GraphCompileError::UnknownEdgeEndpoint(node.clone()));
        }
        let successors = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
        if !successors.iter().any(|s| s == target) {
            return Err(GraphCompileError::UndeclaredDefaultRoute {
                node: node.clone(),
                target: target.clone(),
            });
        }
    }

    detect_illegal_cycles(&nodes, &adjacency)?;

    let mut parent_counts = FxHashMap::default();
    for id in nodes.keys() {
        let count = parent_order.get(id).map_or(0, |p| {
            // a self-edge (LoopNode re-entry) never blocks on itself
            p.iter().filter(|parent| *parent != id).count()
        });
        parent_counts.insert(id.clone(), count);
    }

    Ok(Graph {
        nodes,
        entry,
        adjacency,
        reverse,
        parent_counts,
        parent_order,
        default_routes,
        policy_overrides,
    })
}

/// Rejects any cycle that is not purely a node's self-edge (§3 "Non-goals":
/// cycles are only legal as LoopNode self-re-entry). Runs Kahn's algorithm
/// over the graph with self-edges removed; any node left with nonzero
/// in-degree afterward is part of a real cycle.
fn detect_illegal_cycles(
    nodes: &FxHashMap<NodeId, Arc<dyn Node>>,
    adjacency: &FxHashMap<NodeId, Vec<NodeId>>,
) -> Result<(), GraphCompileError> {
    let mut in_degree: FxHashMap<NodeId, usize> = nodes.keys().map(|n| (n.clone(), 0)).collect();
    for (from, tos) in adjacency {
        for to in tos {
            if to != from {
                *in_degree.entry(to.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut queue: Vec<NodeId> = in_degree
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(id, _)| id.clone())
        .collect();
    queue.sort();
    let mut visited = 0usize;
    let mut idx = 0;
    while idx < queue.len() {
        let current = queue[idx].clone();
        idx += 1;
        visited += 1;
        if let Some(tos) = adjacency.get(&current) {
            for to in tos {
                if to == &current {
                    continue;
                }
                if let Some(count) = in_degree.get_mut(to) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push(to.clone());
                    }
                }
            }
        }
    }

    if visited != nodes.len() {
        let remaining: Vec<NodeId> = in_degree
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(id, _)| id)
            .collect();
        return Err(GraphCompileError::Cycle(remaining));
    }
    Ok(())
}
