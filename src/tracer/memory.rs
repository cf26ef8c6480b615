//! A [`Tracer`] that captures spans/events in memory, mirroring the
//! teacher's `MemorySink` (`src/event_bus/bus.rs`) — used in tests to assert
//! on exactly what was traced without a subscriber attached.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Event, Level, Span, SpanId, SpanKind, SpanStatus, Tracer};
use crate::error::LadderError;

#[derive(Default)]
struct Recorded {
    spans: Vec<Span>,
    events: Vec<Event>,
    stack: Vec<SpanId>,
}

/// Captures every span/event for later assertion via [`InMemoryTracer::spans`]
/// and [`InMemoryTracer::events`].
pub struct InMemoryTracer {
    trace_id: String,
    service_name: String,
    recorded: Mutex<Recorded>,
}

impl InMemoryTracer {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            service_name: service_name.into(),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    #[must_use]
    pub fn spans(&self) -> Vec<Span> {
        self.recorded.lock().spans.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.recorded.lock().events.clone()
    }
}

impl Tracer for InMemoryTracer {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn start_span(&self, name: &str, kind: SpanKind, attributes: Value) -> SpanId {
        let span_id = SpanId::new();
        let mut recorded = self.recorded.lock();
        let parent_span_id = recorded.stack.last().copied();
        recorded.spans.push(Span {
            trace_id: self.trace_id.clone(),
            span_id,
            parent_span_id,
            service_name: self.service_name.clone(),
            kind,
            name: name.to_string(),
            attributes,
            status: SpanStatus::Ok,
            error: None,
            start_time: Utc::now(),
            end_time: None,
        });
        recorded.stack.push(span_id);
        span_id
    }

    fn end_span(&self, span: SpanId, status: SpanStatus, error: Option<LadderError>) {
        let mut recorded = self.recorded.lock();
        if let Some(pos) = recorded.stack.iter().rposition(|s| *s == span) {
            recorded.stack.truncate(pos);
        }
        if let Some(record) = recorded.spans.iter_mut().rev().find(|s| s.span_id == span) {
            record.status = status;
            record.error = error;
            record.end_time = Some(Utc::now());
        }
    }

    fn emit_event(
        &self,
        span: SpanId,
        event_type: &str,
        level: Level,
        message: Option<String>,
        attributes: Value,
    ) {
        self.recorded.lock().events.push(Event {
            trace_id: self.trace_id.clone(),
            span_id: span,
            event_type: event_type.to_string(),
            level,
            message,
            attributes,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn captures_span_parentage() {
        let tracer = InMemoryTracer::new("trace-1", "flowcore");
        let outer = tracer.start_span("flow", SpanKind::Flow, json!({}));
        let inner = tracer.start_span("classify", SpanKind::Node, json!({}));
        tracer.end_span(inner, SpanStatus::Ok, None);
        tracer.end_span(outer, SpanStatus::Ok, None);

        let spans = tracer.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].parent_span_id, Some(outer));
        assert!(spans.iter().all(|s| s.end_time.is_some()));
    }

    #[test]
    fn captures_error_status_and_cause() {
        let tracer = InMemoryTracer::new("trace-1", "flowcore");
        let span = tracer.start_span("classify", SpanKind::Node, json!({}));
        tracer.end_span(span, SpanStatus::Error, Some(LadderError::msg("boom")));
        let recorded = &tracer.spans()[0];
        assert_eq!(recorded.status, SpanStatus::Error);
        assert_eq!(recorded.error.as_ref().unwrap().message, "boom");
    }

    #[test]
    fn captures_events() {
        let tracer = InMemoryTracer::new("trace-1", "flowcore");
        let span = tracer.start_span("classify", SpanKind::Node, json!({}));
        tracer.emit_event(span, "retry", Level::Warn, Some("attempt 2".into()), json!({"attempt": 2}));
        let events = tracer.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "retry");
    }
}
