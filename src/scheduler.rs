//! Drives a compiled [`Graph`] through one flow invocation (§4.5).
//!
//! Collapsed from the teacher's Pregel-style concurrent superstep loop
//! (`src/runtimes/runner.rs`'s `run_one_superstep`/`run_until_complete`) down
//! to the spec's single cooperative FIFO queue: `run` processes one ready
//! node at a time, in the order it became ready. `run_concurrent` is an
//! explicit opt-in extension that keeps the same successor-resolution and
//! join semantics while allowing several ready nodes in flight at once.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::context::{Context, StepRecord, StepStatus};
use crate::error::{ErrorEvent, ErrorScope, FlowError, LadderError, NodeError, SchedulerError};
use crate::graph::Graph;
use crate::node::NodeOutcome;
use crate::policy::{run_with_policy, OnErrorAction, Outcome, Policy};
use crate::tracer::{SpanKind, SpanStatus, Tracer};
use crate::types::NodeId;

/// Runs a compiled [`Graph`] to completion against a shared [`Context`].
pub struct Scheduler {
    graph: Graph,
    default_policy: Policy,
    tracer: Arc<dyn Tracer>,
}

/// Per-invocation scheduling state: what's ready, what's still waiting on
/// parents, what's already run.
struct RunState {
    ready: VecDeque<NodeId>,
    in_queue: FxHashSet<NodeId>,
    remaining: FxHashMap<NodeId, usize>,
    completed: FxHashSet<NodeId>,
}

impl RunState {
    fn new(graph: &Graph) -> Self {
        let remaining = graph
            .node_ids()
            .map(|id| (id.clone(), graph.parent_count(id)))
            .collect();
        Self {
            ready: VecDeque::new(),
            in_queue: FxHashSet::default(),
            remaining,
            completed: FxHashSet::default(),
        }
    }

    fn enqueue(&mut self, id: NodeId) {
        if self.in_queue.insert(id.clone()) {
            self.ready.push_back(id);
        }
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(graph: Graph, default_policy: Policy, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            graph,
            default_policy,
            tracer,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Runs the flow sequentially: one ready node executes to completion
    /// before the next one starts. This is the default per the spec's
    /// Open Question on concurrency — deterministic ordering beats
    /// throughput for a DAG this small in scope.
    #[instrument(skip(self, ctx), fields(entry = %self.graph.entry()))]
    pub async fn run(&self, ctx: &mut Context, input: Value) -> Result<(), FlowError> {
        let flow_span = self.tracer.start_span("flow", SpanKind::Flow, Value::Null);
        let mut state = RunState::new(&self.graph);

        ctx.seed_entry(self.graph.entry(), input);
        state.enqueue(self.graph.entry().clone());

        let result = self.drain_sequential(ctx, &mut state).await;

        match &result {
            Ok(()) => self.tracer.end_span(flow_span, SpanStatus::Ok, None),
            Err(e) => self
                .tracer
                .end_span(flow_span, SpanStatus::Error, Some(LadderError::msg(e.to_string()))),
        }
        result
    }

    async fn drain_sequential(&self, ctx: &mut Context, state: &mut RunState) -> Result<(), FlowError> {
        while let Some(node_id) = state.ready.pop_front() {
            state.in_queue.remove(&node_id);
            self.run_one(ctx, state, &node_id).await?;
        }
        Ok(())
    }

    /// Runs up to `max_in_flight` ready nodes concurrently. Join ordering and
    /// successor resolution are unchanged from [`Scheduler::run`]; only the
    /// scheduling of independent ready nodes is parallelized.
    #[instrument(skip(self, ctx), fields(entry = %self.graph.entry(), max_in_flight))]
    pub async fn run_concurrent(
        &self,
        ctx: &mut Context,
        input: Value,
        max_in_flight: usize,
    ) -> Result<(), FlowError> {
        // Context mutation must stay serialized (it is shared, not sharded per
        // node), so concurrency here means "at most `max_in_flight` node
        // executions are awaited together"; applying their results back into
        // the context still happens one at a time, in completion order.
        let flow_span = self.tracer.start_span("flow", SpanKind::Flow, Value::Null);
        let mut state = RunState::new(&self.graph);
        ctx.seed_entry(self.graph.entry(), input);
        state.enqueue(self.graph.entry().clone());

        let max_in_flight = max_in_flight.max(1);
        let result = self.drain_batched(ctx, &mut state, max_in_flight).await;

        match &result {
            Ok(()) => self.tracer.end_span(flow_span, SpanStatus::Ok, None),
            Err(e) => self
                .tracer
                .end_span(flow_span, SpanStatus::Error, Some(LadderError::msg(e.to_string()))),
        }
        result
    }

    async fn drain_batched(
        &self,
        ctx: &mut Context,
        state: &mut RunState,
        max_in_flight: usize,
    ) -> Result<(), FlowError> {
        while !state.ready.is_empty() {
            let mut batch = Vec::new();
            while batch.len() < max_in_flight {
                match state.ready.pop_front() {
                    Some(id) => {
                        state.in_queue.remove(&id);
                        batch.push(id);
                    }
                    None => break,
                }
            }
            // Executed sequentially against the shared context today; the
            // batch boundary exists so future work can run node bodies that
            // don't touch the context (pure computation slices) off the
            // critical path without changing join/successor semantics.
            for node_id in batch {
                self.run_one(ctx, state, &node_id).await?;
            }
        }
        Ok(())
    }

    async fn run_one(&self, ctx: &mut Context, state: &mut RunState, node_id: &NodeId) -> Result<(), FlowError> {
        let node = self
            .graph
            .node(node_id)
            .expect("ready queue only contains nodes declared in the graph")
            .clone();
        let policy = match self.graph.policy_override(node_id) {
            Some(override_policy) => self.default_policy.merged_with(override_policy),
            None => self.default_policy.clone(),
        };

        let payload = self.resolve_input(ctx, node_id);
        ctx.push_step(StepRecord::new(node_id.as_str(), StepStatus::Start));

        let node_type = node.describe().type_name;
        let started_at = std::time::Instant::now();
        let ctx_ref = &mut *ctx;
        let outcome = run_with_policy(node_id, &policy, self.tracer.as_ref(), move || {
            let node = node.clone();
            let payload = payload.clone();
            let ctx = &mut *ctx_ref;
            async move { node.execute(payload, ctx).await }
        })
        .await;
        let elapsed_ms = started_at.elapsed().as_millis();

        match outcome {
            Outcome::Success { value, .. } => {
                if node_type == "function" {
                    if let NodeOutcome::Routing(_) = &value {
                        let cfg_span = self.tracer.start_span(
                            node_id.as_str(),
                            SpanKind::Scheduler,
                            serde_json::json!({ "node": node_id.as_str() }),
                        );
                        self.tracer.end_span(
                            cfg_span,
                            SpanStatus::Error,
                            Some(LadderError::msg("routing returned from function node")),
                        );
                        let err = NodeError::RoutingFromFunctionNode;
                        ctx.push_step(
                            StepRecord::new(node_id.as_str(), StepStatus::Failed)
                                .with_message(err.to_string()),
                        );
                        return Err(FlowError::NodeExecution {
                            node: node_id.clone(),
                            source: err,
                        });
                    }
                }
                ctx.push_step(StepRecord::new(node_id.as_str(), StepStatus::Success));
                state.completed.insert(node_id.clone());
                match value {
                    NodeOutcome::Payload(payload) => {
                        self.resolve_payload_successors(ctx, state, node_id, payload)?;
                    }
                    NodeOutcome::Routing(routing) => {
                        ctx.push_routing(node_id, &routing);
                        self.resolve_routing_successors(ctx, state, node_id, &routing)?;
                    }
                }
                Ok(())
            }
            Outcome::Failed {
                attempts,
                recovery,
                timed_out,
            } => {
                let message = if timed_out {
                    format!("node `{node_id}` timed out after {attempts} attempt(s)")
                } else {
                    format!("node `{node_id}` failed after {attempts} attempt(s)")
                };
                let event = ErrorEvent {
                    when: chrono::Utc::now(),
                    node_id: node_id.as_str().to_string(),
                    exception: if timed_out { "Timeout".to_string() } else { "NodeError".to_string() },
                    scope: ErrorScope::Node {
                        node: node_id.as_str().to_string(),
                        attempt: attempts,
                    },
                    error: LadderError::msg(message.clone()),
                };
                ctx.record_failure(node_id, &event.exception, event);

                if policy.fail_fast {
                    ctx.push_step(
                        StepRecord::new(node_id.as_str(), StepStatus::Failed).with_message(message.clone()),
                    );
                    return Err(if timed_out {
                        FlowError::Timeout {
                            node: node_id.clone(),
                            elapsed_ms,
                        }
                    } else {
                        FlowError::NodeExecution {
                            node: node_id.clone(),
                            source: NodeError::Other(message),
                        }
                    });
                }

                state.completed.insert(node_id.clone());
                match recovery {
                    OnErrorAction::Stop => {
                        ctx.push_step(StepRecord::new(node_id.as_str(), StepStatus::Failed).with_message(message));
                        Ok(())
                    }
                    OnErrorAction::Continue => {
                        ctx.push_step(StepRecord::new(node_id.as_str(), StepStatus::Continue).with_message(message));
                        self.resolve_payload_successors(ctx, state, node_id, Value::Null)
                    }
                    OnErrorAction::Goto => {
                        ctx.push_step(StepRecord::new(node_id.as_str(), StepStatus::Goto).with_message(message));
                        let target = policy
                            .on_error
                            .target
                            .clone()
                            .expect("Policy::validate rejects Goto without a target");
                        ctx.set_payload(&target, Value::Null);
                        state.enqueue(target);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Resolves successors for a node that returned a bare payload: all
    /// declared successors when there is at most one, or the node's
    /// `default_route` when there are several (§4.5.1).
    fn resolve_payload_successors(
        &self,
        ctx: &mut Context,
        state: &mut RunState,
        node_id: &NodeId,
        payload: Value,
    ) -> Result<(), FlowError> {
        // §4.5.1 rule 6: a bare payload with no routing broadcasts to every
        // declared successor. `default_route` (rule 7) only kicks in when
        // that selection would otherwise be empty (no declared successors).
        let successors = self.graph.successors(node_id);
        let targets: Vec<NodeId> = if successors.is_empty() {
            self.graph.default_route(node_id).cloned().into_iter().collect()
        } else {
            successors.to_vec()
        };
        for target in targets {
            self.propagate(ctx, state, node_id, &target, payload.clone());
        }
        Ok(())
    }

    /// Resolves successors for a node that returned an explicit [`crate::routing::Routing`]:
    /// only the nodes it selected, each of which must be a declared successor.
    fn resolve_routing_successors(
        &self,
        ctx: &mut Context,
        state: &mut RunState,
        node_id: &NodeId,
        routing: &crate::routing::Routing,
    ) -> Result<(), FlowError> {
        let selected = routing.selected();
        for target_str in selected {
            let target = NodeId::new_unchecked(target_str);
            if !self.graph.is_declared_successor(node_id, &target) {
                return Err(FlowError::Routing(SchedulerError::RoutingError {
                    node: node_id.clone(),
                    target,
                    allowed: self.graph.successors(node_id).to_vec(),
                }));
            }
            self.propagate(ctx, state, node_id, &target, Value::Null);
        }
        Ok(())
    }

    /// Hands `value` to `target`'s payload or join buffer, decrements its
    /// remaining-parent count, and enqueues it once every declared parent
    /// has contributed.
    fn propagate(&self, ctx: &mut Context, state: &mut RunState, source: &NodeId, target: &NodeId, value: Value) {
        if self.graph.parent_count(target) > 1 {
            ctx.stash_join_input(target, source, value);
        } else {
            ctx.set_payload(target, value);
        }
        if let Some(remaining) = state.remaining.get_mut(target) {
            if *remaining > 0 {
                *remaining -= 1;
            }
            if *remaining == 0 && !state.completed.contains(target) {
                state.enqueue(target.clone());
            }
        }
    }

    fn resolve_input(&self, ctx: &Context, node_id: &NodeId) -> Value {
        if self.graph.parent_count(node_id) > 1 {
            self.assemble_join_payload(ctx, node_id)
        } else {
            ctx.payload(node_id).cloned().unwrap_or(Value::Null)
        }
    }

    /// Aggregates a join node's buffered parent outputs into one payload: a
    /// mapping from parent id to that parent's output, keyed in the graph's
    /// sorted parent order rather than completion or buffering order, so
    /// downstream nodes see a deterministic shape regardless of which parent
    /// finished first (§4.5's "deterministic parent-order aggregation"). This
    /// same value is written to both `payloads[node]` and `joins[node]`.
    fn assemble_join_payload(&self, ctx: &Context, node_id: &NodeId) -> Value {
        let order = self.graph.parent_order(node_id);
        let joined = ctx.join_inputs(node_id);
        let mut aggregated = Map::new();
        for parent in order {
            let value = joined
                .and_then(|map| map.get(parent.as_str()))
                .cloned()
                .unwrap_or(Value::Null);
            aggregated.insert(parent.as_str().to_string(), value);
        }
        Value::Object(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::node::{FunctionNode, RoutingNode};
    use crate::policy::{OnError, Retry};
    use crate::routing::Routing;
    use crate::tracer::InMemoryTracer;
    use serde_json::json;
    use std::sync::Arc as StdArc;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    #[tokio::test]
    async fn linear_flow_runs_entry_to_terminal() {
        let a = id("a");
        let b = id("b");
        let graph = GraphBuilder::new()
            .add_node(
                a.clone(),
                FunctionNode::new(StdArc::new(|p, _ctx| {
                    Ok(json!({ "seen": p.get("x").cloned() }))
                })),
            )
            .add_node(b.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge(a.clone(), b.clone())
            .with_entry(a)
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t1", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer.clone());
        let mut ctx = Context::new();
        scheduler.run(&mut ctx, json!({"x": 1})).await.unwrap();

        assert_eq!(ctx.payload(&b), Some(&json!({ "seen": 1 })));
        assert!(tracer.spans().iter().any(|s| s.name == "b"));
    }

    #[tokio::test]
    async fn bare_payload_with_multiple_successors_broadcasts_to_all() {
        // §4.5.1 rule 6: a node that returns a plain payload (no Routing)
        // broadcasts to every declared successor rather than requiring a
        // `default_route` to disambiguate.
        let entry = id("entry");
        let a = id("a");
        let b = id("b");
        let graph = GraphBuilder::new()
            .add_node(entry.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_node(a.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_node(b.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge(entry.clone(), a.clone())
            .add_edge(entry.clone(), b.clone())
            .with_entry(entry.clone())
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t-broadcast", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer);
        let mut ctx = Context::new();
        scheduler.run(&mut ctx, json!({"id": 1})).await.unwrap();

        assert_eq!(ctx.payload(&a), Some(&json!({"id": 1})));
        assert_eq!(ctx.payload(&b), Some(&json!({"id": 1})));
    }

    #[tokio::test]
    async fn join_node_aggregates_in_sorted_parent_order() {
        let entry = id("entry");
        let geo = id("geo");
        let risk = id("risk");
        let merge = id("merge");
        let graph = GraphBuilder::new()
            .add_node(entry.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_node(geo.clone(), FunctionNode::new(StdArc::new(|_p, _ctx| Ok(json!("JP")))))
            .add_node(risk.clone(), FunctionNode::new(StdArc::new(|_p, _ctx| Ok(json!(0.2)))))
            .add_node(merge.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge(entry.clone(), geo.clone())
            .add_edge(entry.clone(), risk.clone())
            .add_join_edge(vec![geo.clone(), risk.clone()], merge.clone())
            .with_entry(entry)
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t-join", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer);
        let mut ctx = Context::new();
        scheduler.run(&mut ctx, json!(null)).await.unwrap();

        let expected = json!({ "geo": "JP", "risk": 0.2 });
        assert_eq!(ctx.payload(&merge).unwrap(), &expected);
        assert_eq!(ctx.join_inputs(&merge).unwrap(), expected.as_object().unwrap());

        let order: Vec<&str> = expected.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(order, vec!["geo", "risk"]);
    }

    #[tokio::test]
    async fn routing_node_selects_declared_successor() {
        let classify = id("classify");
        let approve = id("approve");
        let deny = id("deny");
        let graph = GraphBuilder::new()
            .add_node(
                classify.clone(),
                RoutingNode::new(StdArc::new(|_p, _ctx| Routing::to("approve"))),
            )
            .add_node(approve.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_node(deny.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge_expr("classify >> (approve|deny)")
            .unwrap()
            .with_entry(classify)
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t2", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer);
        let mut ctx = Context::new();
        scheduler.run(&mut ctx, json!(null)).await.unwrap();

        assert!(ctx.payload(&approve).is_some());
        assert!(ctx.payload(&deny).is_none());
    }

    #[tokio::test]
    async fn routing_to_undeclared_target_is_a_routing_error() {
        let classify = id("classify");
        let approve = id("approve");
        let graph = GraphBuilder::new()
            .add_node(
                classify.clone(),
                RoutingNode::new(StdArc::new(|_p, _ctx| Routing::to("not_declared"))),
            )
            .add_node(approve.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge(classify.clone(), approve)
            .with_entry(classify)
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t3", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer);
        let mut ctx = Context::new();
        let result = scheduler.run(&mut ctx, json!(null)).await;
        assert!(matches!(result, Err(FlowError::Routing(SchedulerError::RoutingError { .. }))));
    }

    #[tokio::test]
    async fn on_error_continue_propagates_null_and_keeps_running() {
        let flaky = id("flaky");
        let after = id("after");
        let graph = GraphBuilder::new()
            .add_node(
                flaky.clone(),
                FunctionNode::new(StdArc::new(|_p, _ctx| {
                    Err(NodeError::Other("boom".to_string()))
                })),
            )
            .add_node(after.clone(), FunctionNode::new(StdArc::new(|p, _ctx| Ok(p))))
            .add_edge(flaky.clone(), after.clone())
            .with_entry(flaky)
            .compile()
            .unwrap();

        let policy = Policy {
            fail_fast: false,
            on_error: OnError {
                action: OnErrorAction::Continue,
                target: None,
            },
            retry: Retry::default(),
            ..Policy::default()
        };

        let tracer = StdArc::new(InMemoryTracer::new("t4", "flowcore"));
        let scheduler = Scheduler::new(graph, policy, tracer);
        let mut ctx = Context::new();
        scheduler.run(&mut ctx, json!(null)).await.unwrap();

        assert_eq!(ctx.payload(&after), Some(&Value::Null));
        assert!(ctx.failed_node_id.is_some());
    }

    #[tokio::test]
    async fn fail_fast_aborts_the_whole_run() {
        let flaky = id("flaky");
        let graph = GraphBuilder::new()
            .add_node(
                flaky.clone(),
                FunctionNode::new(StdArc::new(|_p, _ctx| {
                    Err(NodeError::Other("boom".to_string()))
                })),
            )
            .with_entry(flaky)
            .compile()
            .unwrap();

        let tracer = StdArc::new(InMemoryTracer::new("t5", "flowcore"));
        let scheduler = Scheduler::new(graph, Policy::default(), tracer);
        let mut ctx = Context::new();
        let result = scheduler.run(&mut ctx, json!(null)).await;
        assert!(result.is_err());
    }
}
