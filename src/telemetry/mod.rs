//! Human-readable rendering of tracer events and the chained-cause error
//! log, plus the process-wide `tracing` subscriber (§6, ambient stack).
//!
//! Generalized from the teacher's `TelemetryFormatter`/`PlainFormatter`
//! pair: same colorized-line rendering convention, retargeted from
//! `event_bus::Event`/`channels::errors::ErrorEvent` to this crate's
//! `tracer::Event`/`error::ErrorEvent`.

pub mod subscriber;

pub use subscriber::init_subscriber;

use crate::error::{ErrorEvent, LadderError};
use crate::tracer::Event;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta / dark pink
pub const RESET_COLOR: &str = "\x1b[0m";

/// Rendered output for one telemetry item, ready to be written to a sink.
#[derive(Clone, Debug, Default)]
pub struct EventRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl EventRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_event(&self, event: &Event) -> EventRender;
    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender>;
}

pub struct PlainFormatter;

fn format_error_chain(error: &LadderError, indent: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(cause) = &error.cause {
        let indent_str = "  ".repeat(indent);
        lines.push(format!(
            "{LINE_COLOR}{}cause: {}{RESET_COLOR}\n",
            indent_str, cause.message
        ));
        lines.extend(format_error_chain(cause, indent + 1));
    }
    lines
}

impl TelemetryFormatter for PlainFormatter {
    fn render_event(&self, event: &Event) -> EventRender {
        let message = event.message.as_deref().unwrap_or("");
        let line = format!(
            "{LINE_COLOR}[{:?}] {}: {}{RESET_COLOR}\n",
            event.level, event.event_type, message
        );
        EventRender {
            context: Some(event.span_id.to_string()),
            lines: vec![line],
        }
    }

    fn render_errors(&self, errors: &[ErrorEvent]) -> Vec<EventRender> {
        errors
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let mut lines = Vec::new();
                let scope_str = format!("{CONTEXT_COLOR}{:?}{RESET_COLOR}", e.scope);
                lines.push(format!("[{}] {} | {}\n", i, e.when, scope_str));
                lines.push(format!(
                    "{LINE_COLOR}  error: {}{RESET_COLOR}\n",
                    e.error.message
                ));
                lines.extend(format_error_chain(&e.error, 1));
                if !e.error.details.is_null() {
                    lines.push(format!(
                        "{LINE_COLOR}  details: {}{RESET_COLOR}\n",
                        e.error.details
                    ));
                }
                EventRender {
                    context: Some(format!("{:?}", e.scope)),
                    lines,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorScope;
    use crate::tracer::{Level, SpanKind, SpanStatus, Tracer};
    use chrono::Utc;

    #[test]
    fn render_errors_includes_cause_chain() {
        let formatter = PlainFormatter;
        let error = LadderError::msg("outer").with_cause(LadderError::msg("inner"));
        let events = vec![ErrorEvent {
            when: Utc::now(),
            node_id: "classify".to_string(),
            exception: "ValidationFailed".to_string(),
            scope: ErrorScope::Node {
                node: "classify".to_string(),
                attempt: 1,
            },
            error,
        }];
        let rendered = formatter.render_errors(&events);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].join_lines().contains("inner"));
    }

    #[test]
    fn render_event_includes_event_type() {
        let tracer = crate::tracer::InMemoryTracer::new("t1", "flowcore");
        let span = tracer.start_span("classify", SpanKind::Node, serde_json::json!({}));
        tracer.emit_event(span, "retry", Level::Warn, Some("attempt 2".into()), serde_json::json!({}));
        tracer.end_span(span, SpanStatus::Ok, None);

        let formatter = PlainFormatter;
        let rendered = formatter.render_event(&tracer.events()[0]);
        assert!(rendered.join_lines().contains("retry"));
    }
}
