//! A [`Tracer`] that renders spans and events through `tracing` macros,
//! mirroring the teacher's `StdOutSink` (`src/event_bus/bus.rs`).

use std::sync::Mutex;

use serde_json::Value;

use super::{Level, SpanId, SpanKind, SpanStatus, Tracer};
use crate::error::LadderError;

/// Logs every span/event through the `tracing` subscriber installed by
/// [`crate::telemetry::init_subscriber`]. Keeps only a small open-span stack
/// in memory; nothing is persisted.
pub struct ConsoleTracer {
    trace_id: String,
    service_name: String,
    stack: Mutex<Vec<SpanId>>,
}

impl ConsoleTracer {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            service_name: service_name.into(),
            stack: Mutex::new(Vec::new()),
        }
    }
}

impl Tracer for ConsoleTracer {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn start_span(&self, name: &str, kind: SpanKind, attributes: Value) -> SpanId {
        let span_id = SpanId::new();
        let parent = self.stack.lock().unwrap().last().copied();
        tracing::info!(
            trace_id = %self.trace_id,
            span_id = %span_id,
            parent_span_id = parent.map(|p| p.to_string()),
            ?kind,
            name,
            %attributes,
            "span started"
        );
        self.stack.lock().unwrap().push(span_id);
        span_id
    }

    fn end_span(&self, span: SpanId, status: SpanStatus, error: Option<LadderError>) {
        {
            let mut stack = self.stack.lock().unwrap();
            if let Some(pos) = stack.iter().rposition(|s| *s == span) {
                stack.truncate(pos);
            }
        }
        match &error {
            Some(err) => tracing::error!(
                trace_id = %self.trace_id,
                span_id = %span,
                ?status,
                error = %err,
                "span ended"
            ),
            None => tracing::info!(
                trace_id = %self.trace_id,
                span_id = %span,
                ?status,
                "span ended"
            ),
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
        let message = message.unwrap_or_default();
        match level {
            Level::Info => tracing::info!(trace_id = %self.trace_id, span_id = %span, event_type, %attributes, "{message}"),
            Level::Warn => tracing::warn!(trace_id = %self.trace_id, span_id = %span, event_type, %attributes, "{message}"),
            Level::Error => tracing::error!(trace_id = %self.trace_id, span_id = %span, event_type, %attributes, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_and_end_span_does_not_panic() {
        let tracer = ConsoleTracer::new("trace-1", "flowcore");
        let span = tracer.start_span("classify", SpanKind::Node, json!({}));
        tracer.emit_event(span, "log", Level::Info, Some("working".into()), json!({}));
        tracer.end_span(span, SpanStatus::Ok, None);
    }
}
