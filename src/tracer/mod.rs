//! The tracing interface (§4.6) and its persisted span/event schema (§6).
//!
//! Two implementations ship here, mirroring the teacher's stdout/memory sink
//! split in `event_bus`: [`console::ConsoleTracer`] renders through `tracing`
//! macros for humans, [`memory::InMemoryTracer`] captures everything for
//! assertions in tests.

pub mod console;
pub mod memory;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::LadderError;

pub use console::ConsoleTracer;
pub use memory::InMemoryTracer;

/// Opaque span identifier, unique within one trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpanId(Uuid);

impl SpanId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of unit of work a span represents, per §6's `kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    Flow,
    Node,
    Policy,
    Scheduler,
}

/// Terminal outcome of a span, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Ok,
    Error,
    Cancelled,
}

/// Event severity, per §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Info,
    Warn,
    Error,
}

/// A persisted span record, matching §6's wire schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    pub service_name: String,
    pub kind: SpanKind,
    pub name: String,
    #[serde(default)]
    pub attributes: Value,
    pub status: SpanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<LadderError>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

/// A persisted event record, matching §6's wire schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub trace_id: String,
    pub span_id: SpanId,
    pub event_type: String,
    pub level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub attributes: Value,
    pub timestamp: DateTime<Utc>,
}

/// The tracing interface every scheduler run drives spans/events through
/// (§4.6). Implementations own the span stack: `start_span` infers its
/// parent from whatever span is currently open on this tracer.
pub trait Tracer: Send + Sync {
    fn trace_id(&self) -> &str;

    /// Opens a new span, parented to the most recently opened still-open
    /// span on this tracer (or root, if none).
    fn start_span(&self, name: &str, kind: SpanKind, attributes: Value) -> SpanId;

    /// Closes `span`, finalizing its status and, for error outcomes, its
    /// chained-cause error.
    fn end_span(&self, span: SpanId, status: SpanStatus, error: Option<LadderError>);

    /// Records a point-in-time event against `span`.
    fn emit_event(
        &self,
        span: SpanId,
        event_type: &str,
        level: Level,
        message: Option<String>,
        attributes: Value,
    );
}

/// A RAII-ish convenience for the common "span wraps one fallible operation"
/// pattern: call [`SpanGuard::end_ok`] or [`SpanGuard::end_err`] exactly
/// once.
pub struct SpanGuard<'a> {
    tracer: &'a dyn Tracer,
    span: SpanId,
    ended: bool,
}

impl<'a> SpanGuard<'a> {
    pub fn open(tracer: &'a dyn Tracer, name: &str, kind: SpanKind, attributes: Value) -> Self {
        let span = tracer.start_span(name, kind, attributes);
        Self {
            tracer,
            span,
            ended: false,
        }
    }

    pub fn id(&self) -> SpanId {
        self.span
    }

    pub fn end_ok(mut self) {
        self.tracer.end_span(self.span, SpanStatus::Ok, None);
        self.ended = true;
    }

    pub fn end_err(mut self, error: LadderError) {
        self.tracer.end_span(self.span, SpanStatus::Error, Some(error));
        self.ended = true;
    }

    pub fn end_cancelled(mut self) {
        self.tracer.end_span(self.span, SpanStatus::Cancelled, None);
        self.ended = true;
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if !self.ended {
            self.tracer.end_span(self.span, SpanStatus::Ok, None);
        }
    }
}
