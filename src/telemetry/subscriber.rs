//! Process-wide `tracing` subscriber setup.
//!
//! No single equivalent lives in the teacher — its `tracing-subscriber`/
//! `tracing-error` dependencies are wired up ambiently by whichever binary
//! embeds the crate. This exposes that wiring once so every
//! [`crate::tracer::ConsoleTracer`] gets consistent formatting.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global subscriber: an env-filtered, ANSI fmt layer plus
/// `tracing-error`'s `ErrorLayer` so `miette`/`SpanTrace` capture works from
/// any span. Safe to call more than once; later calls are no-ops.
pub fn init_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_ansi(true).with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_is_idempotent() {
        init_subscriber();
        init_subscriber();
    }
}
