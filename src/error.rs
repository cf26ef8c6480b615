//! Top-level error types and the chained-cause error log used by the reserved
//! `errors` context key.
//!
//! `FlowError` is the single error type `run`/`run_until_complete` surface to
//! callers; it implements [`miette::Diagnostic`] so CLI-style consumers get a
//! code and help text per variant. `ErrorEvent`/`LadderError` are the
//! serializable records stored in [`crate::context::Context::errors`] — they
//! outlive the `Result` that produced them, since the context is inspectable
//! after a `continue`/`goto` recovery.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::NodeId;

/// Errors raised while compiling a [`crate::graph::GraphBuilder`] into a
/// [`crate::graph::Graph`].
///
/// Always raised at compile time; never retried, never subject to
/// `on_error` recovery.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    #[error("unknown node type `{type_name}` for node `{node}`")]
    #[diagnostic(
        code(flowcore::graph::unknown_node_type),
        help("Register this type with the node registry before compiling.")
    )]
    UnknownNodeType { node: NodeId, type_name: String },

    #[error("graph has no entry node declared")]
    #[diagnostic(
        code(flowcore::graph::missing_entry),
        help("Call `GraphBuilder::with_entry` before compiling.")
    )]
    MissingEntry,

    #[error("edge references unknown node `{0}`")]
    #[diagnostic(code(flowcore::graph::unknown_edge_endpoint))]
    UnknownEdgeEndpoint(NodeId),

    #[error("entry node `{0}` is not declared in this graph")]
    #[diagnostic(code(flowcore::graph::unknown_entry))]
    UnknownEntry(NodeId),

    #[error("node `{node}` has default_route `{target}` which is not a declared successor")]
    #[diagnostic(
        code(flowcore::graph::undeclared_default_route),
        help("default_route must name one of the node's own outgoing edges.")
    )]
    UndeclaredDefaultRoute { node: NodeId, target: NodeId },

    #[error("graph contains a cycle not made of explicit self-edges: {0:?}")]
    #[diagnostic(
        code(flowcore::graph::cycle),
        help("Only self-edges (for LoopNode) may form a cycle.")
    )]
    Cycle(Vec<NodeId>),

    #[error("failed to parse edge expression `{expr}`: {reason}")]
    #[diagnostic(code(flowcore::graph::edge_parse))]
    EdgeParse { expr: String, reason: String },

    #[error("`<<` is not a supported edge operator in `{0}`")]
    #[diagnostic(
        code(flowcore::graph::reversed_edge),
        help("Edges are always written left-to-right with `>>`.")
    )]
    ReversedEdgeOperator(String),

    #[error(transparent)]
    #[diagnostic(code(flowcore::graph::invalid_node_id))]
    InvalidNodeId(#[from] crate::types::InvalidNodeId),

    #[error("node `{node}` binding: {reason}")]
    #[diagnostic(code(flowcore::graph::binding))]
    BindingFailed { node: String, reason: String },
}

/// Errors raised by the policy engine while interpreting `Policy`.
#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("invalid policy shape: {0}")]
    #[diagnostic(code(flowcore::policy::invalid_shape))]
    InvalidShape(String),

    #[error("on_error action is `goto` but no target was given")]
    #[diagnostic(
        code(flowcore::policy::goto_without_target),
        help("Set `on_error.target` to the node id to recover into.")
    )]
    GotoWithoutTarget,

    #[error("goto target `{0}` does not exist in the compiled graph")]
    #[diagnostic(code(flowcore::policy::goto_unknown_target))]
    GotoUnknownTarget(NodeId),

    #[error("could not parse duration `{0}`")]
    #[diagnostic(
        code(flowcore::policy::bad_duration),
        help("Use a bare number of seconds, or a suffixed value like \"250ms\", \"5s\", \"1m\", \"1h\".")
    )]
    BadDuration(String),
}

/// Errors raised directly by node execution.
///
/// Distinct from [`FlowError`]: a `NodeError` is always wrapped into
/// `FlowError::NodeExecution` (after retry/on_error has had a chance to
/// recover) before it reaches a caller of `run`.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(flowcore::node::missing_input),
        help("Check that the previous node produced the required data: {what}.")
    )]
    MissingInput { what: String },

    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(flowcore::node::provider))]
    Provider { provider: &'static str, message: String },

    #[error(transparent)]
    #[diagnostic(code(flowcore::node::serde_json))]
    Serde(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    #[diagnostic(code(flowcore::node::validation))]
    ValidationFailed(String),

    #[error("a function node returned a routing decision instead of a payload")]
    #[diagnostic(
        code(flowcore::node::routing_from_function_node),
        help("Only RoutingNode/LoopNode may return Routing; this is a configuration error, not a retryable fault.")
    )]
    RoutingFromFunctionNode,

    #[error("{0}")]
    #[diagnostic(code(flowcore::node::other))]
    Other(String),
}

/// Errors raised by the resolver while reading or writing a dotted path.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolverError {
    #[error("expression references an undeclared scope `{0}`")]
    #[diagnostic(
        code(flowcore::resolver::unknown_scope),
        help("Valid scopes are $ctx, $env, and the $. shorthand for $ctx.")
    )]
    UnknownScope(String),

    #[error("malformed template expression in `{0}`")]
    #[diagnostic(code(flowcore::resolver::malformed_template))]
    MalformedTemplate(String),

    #[error("output binding expects a mapping result to write named fields, got a scalar")]
    #[diagnostic(code(flowcore::resolver::non_mapping_output))]
    NonMappingOutput,
}

/// Errors raised by the scheduler itself (as opposed to errors produced by
/// node execution, which flow through [`NodeError`]).
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("node `{node}` routed to `{target}`, which is outside its declared successors {allowed:?}")]
    #[diagnostic(
        code(flowcore::scheduler::routing_error),
        help("A node may only route to nodes reachable via its declared edges, or a policy goto target.")
    )]
    RoutingError {
        node: NodeId,
        target: NodeId,
        allowed: Vec<NodeId>,
    },

    #[error("flow was cancelled before completion")]
    #[diagnostic(code(flowcore::scheduler::cancelled))]
    Cancelled,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Policy(#[from] PolicyError),
}

/// The single error type returned by [`crate::scheduler::Scheduler::run`] and
/// [`crate::graph::GraphBuilder::compile`].
#[derive(Debug, Error, Diagnostic)]
pub enum FlowError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Configuration(#[from] GraphCompileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Routing(#[from] SchedulerError),

    #[error("node `{node}` timed out after {elapsed_ms}ms")]
    #[diagnostic(code(flowcore::timeout))]
    Timeout { node: NodeId, elapsed_ms: u128 },

    #[error("node `{node}` failed: {source}")]
    #[diagnostic(code(flowcore::node_execution))]
    NodeExecution {
        node: NodeId,
        #[source]
        source: NodeError,
    },

    #[error("flow was cancelled: {0}")]
    #[diagnostic(code(flowcore::cancelled))]
    Cancelled(String),
}

/// Tags the subsystem that produced an [`ErrorEvent`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    Node { node: String, attempt: u32 },
    Scheduler,
    Policy { node: String },
    #[default]
    Flow,
}

/// A chained-cause error record, serializable into the reserved `errors`
/// context key.
///
/// Mirrors the `{node_id, exception, message}` shape spec.md requires, plus
/// an optional `cause` chain so nested failures (e.g. a timeout wrapping a
/// provider error) can be rendered without losing the original message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LadderError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<LadderError>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for LadderError {
    fn default() -> Self {
        LadderError {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for LadderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LadderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl LadderError {
    pub fn msg(m: impl Into<String>) -> Self {
        LadderError {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: LadderError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl From<&NodeError> for LadderError {
    fn from(err: &NodeError) -> Self {
        LadderError::msg(err.to_string())
    }
}

/// One entry in the reserved `errors` context key: `{node_id, exception, message}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEvent {
    #[serde(default = "Utc::now")]
    pub when: DateTime<Utc>,
    pub node_id: String,
    pub exception: String,
    #[serde(default)]
    pub scope: ErrorScope,
    pub error: LadderError,
}

impl ErrorEvent {
    pub fn node(node_id: impl Into<String>, exception: impl Into<String>, error: LadderError) -> Self {
        let node_id = node_id.into();
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                node: node_id.clone(),
                attempt: 1,
            },
            node_id,
            exception: exception.into(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_error_display_is_message() {
        let e = LadderError::msg("boom");
        assert_eq!(e.to_string(), "boom");
    }

    #[test]
    fn ladder_error_source_chain() {
        let inner = LadderError::msg("inner");
        let outer = LadderError::msg("outer").with_cause(inner.clone());
        assert_eq!(outer.cause.as_deref(), Some(&inner));
    }

    #[test]
    fn flow_error_wraps_node_error() {
        let node_err = NodeError::ValidationFailed("bad input".into());
        let flow_err = FlowError::NodeExecution {
            node: NodeId::new("classify").unwrap(),
            source: node_err,
        };
        assert!(flow_err.to_string().contains("classify"));
    }
}
