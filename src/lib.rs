//! # flowcore: a declarative DAG workflow engine
//!
//! `flowcore` compiles a declarative node/edge configuration into a
//! validated graph, then drives it to completion against a shared,
//! mutable [`context::Context`]: fan-out, deterministic fan-in joins,
//! data-driven routing decisions, and a per-node policy engine for
//! retry/timeout/continue/goto recovery. A thin [`tracer::Tracer`]
//! interface records spans and events for every run.
//!
//! ## Core Concepts
//!
//! - **Context** — the hierarchical mapping shared by a whole flow
//!   invocation: `steps`, `payloads`, `routing`, `joins`, `errors`.
//! - **Node** — the execution contract (`FunctionNode`/`RoutingNode`/
//!   `LoopNode`), bound to a [`types::NodeId`] once per graph.
//! - **Graph** — built with [`graph::GraphBuilder`] (or from a declarative
//!   [`graph::GraphConfig`] through a [`registry::NodeRegistry`]) and
//!   compiled into an executable [`graph::Graph`].
//! - **Scheduler** — [`scheduler::Scheduler`] drives a compiled graph: a
//!   FIFO ready queue, remaining-parent tracking, and successor
//!   resolution from routing decisions or declared edges.
//! - **Policy** — [`policy::Policy`] governs retry/backoff, timeout, and
//!   what happens after a node exhausts its retries.
//!
//! ## Quick Start
//!
//! ### Building and running a linear flow
//!
//! ```
//! use std::sync::Arc;
//! use flowcore::context::Context;
//! use flowcore::graph::GraphBuilder;
//! use flowcore::node::FunctionNode;
//! use flowcore::policy::Policy;
//! use flowcore::scheduler::Scheduler;
//! use flowcore::tracer::InMemoryTracer;
//! use flowcore::types::NodeId;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let classify = NodeId::new("classify").unwrap();
//! let respond = NodeId::new("respond").unwrap();
//!
//! let graph = GraphBuilder::new()
//!     .add_node(
//!         classify.clone(),
//!         FunctionNode::new(Arc::new(|payload, _ctx| Ok(payload))),
//!     )
//!     .add_node(
//!         respond.clone(),
//!         FunctionNode::new(Arc::new(|payload, _ctx| Ok(payload))),
//!     )
//!     .add_edge(classify.clone(), respond.clone())
//!     .with_entry(classify)
//!     .compile()
//!     .unwrap();
//!
//! let tracer = Arc::new(InMemoryTracer::new("trace-1", "flowcore"));
//! let scheduler = Scheduler::new(graph, Policy::default(), tracer);
//! let mut ctx = Context::new();
//! scheduler.run(&mut ctx, json!({"question": "weather?"})).await.unwrap();
//! assert!(ctx.payload(&respond).is_some());
//! # }
//! ```
//!
//! ### Routing and the edge mini-language
//!
//! ```
//! use std::sync::Arc;
//! use flowcore::graph::GraphBuilder;
//! use flowcore::node::{FunctionNode, RoutingNode};
//! use flowcore::routing::Routing;
//! use flowcore::types::NodeId;
//!
//! let classify = NodeId::new("classify").unwrap();
//! let approve = NodeId::new("approve").unwrap();
//! let deny = NodeId::new("deny").unwrap();
//!
//! let graph = GraphBuilder::new()
//!     .add_node(
//!         classify.clone(),
//!         RoutingNode::new(Arc::new(|_payload, _ctx| Routing::to("approve"))),
//!     )
//!     .add_node(approve, FunctionNode::new(Arc::new(|p, _ctx| Ok(p))))
//!     .add_node(deny, FunctionNode::new(Arc::new(|p, _ctx| Ok(p))))
//!     .add_edge_expr("classify >> (approve|deny)")
//!     .unwrap()
//!     .with_entry(classify)
//!     .compile()
//!     .unwrap();
//! assert_eq!(graph.node_ids().count(), 3);
//! ```
//!
//! ### Policy-driven retry
//!
//! ```
//! use std::time::Duration;
//! use flowcore::policy::{OnError, OnErrorAction, Policy, Retry, RetryMode};
//!
//! let policy = Policy {
//!     fail_fast: true,
//!     timeout: Duration::from_secs(5),
//!     retry: Retry {
//!         max_attempts: 3,
//!         delay: Duration::from_millis(100),
//!         mode: RetryMode::Exponential,
//!     },
//!     on_error: OnError {
//!         action: OnErrorAction::Stop,
//!         target: None,
//!     },
//! };
//! assert!(policy.validate().is_ok());
//! ```
//!
//! ## Module Guide
//!
//! - [`context`] — the shared mutable context and its reserved keys.
//! - [`types`] — `NodeId` and other small identifier types.
//! - [`resolver`] — dotted-path and `{{ }}` template evaluation.
//! - [`routing`] — the `Routing` value a node returns to select successors.
//! - [`policy`] — retry/timeout/on-error semantics.
//! - [`node`] — the `Node` contract and its `Function`/`Routing`/`Loop` variants.
//! - [`graph`] — the edge mini-language, `GraphBuilder`, and compilation.
//! - [`registry`] — string-keyed node-type constructor registry.
//! - [`scheduler`] — drives a compiled graph to completion.
//! - [`tracer`] — the tracing interface and its console/in-memory backends.
//! - [`config`] — process-wide defaults (policy, tracer backend, `.env`).
//! - [`telemetry`] — `tracing` subscriber setup and display rendering.
//! - [`error`] — the crate's diagnostic error types.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod routing;
pub mod scheduler;
pub mod telemetry;
pub mod tracer;
pub mod types;
