//! Process-wide engine configuration: default policy, tracer backend
//! selection, trace-id generation, `.env` loading (ambient stack).
//!
//! Generalized from the teacher's `RuntimeConfig`/`EventBusConfig`
//! (`src/runtimes/runtime_config.rs`): that type chose a checkpointer and a
//! sink list for the teacher's event bus; this one chooses a default
//! [`Policy`] and a [`Tracer`] backend for a flow run, following the same
//! `Default` + fluent `with_*` builder shape and the same `dotenvy`-backed
//! environment read.

use std::sync::Arc;

use crate::policy::Policy;
use crate::tracer::{ConsoleTracer, InMemoryTracer, Tracer};

/// Which [`Tracer`] implementation [`FlowConfig::build_tracer`] constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracerBackend {
    /// Logs spans/events through `tracing` macros (the default).
    #[default]
    Console,
    /// Captures spans/events in memory; intended for tests and embedders
    /// that want to inspect a run's trace programmatically.
    Memory,
}

/// Process-wide configuration for running flows.
#[derive(Clone)]
pub struct FlowConfig {
    pub default_policy: Policy,
    pub tracer_backend: TracerBackend,
    pub service_name: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        dotenvy::dotenv().ok();
        let service_name =
            std::env::var("FLOWCORE_SERVICE_NAME").unwrap_or_else(|_| "flowcore".to_string());
        Self {
            default_policy: Policy::default(),
            tracer_backend: TracerBackend::default(),
            service_name,
        }
    }
}

impl FlowConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default_policy(mut self, policy: Policy) -> Self {
        self.default_policy = policy;
        self
    }

    #[must_use]
    pub fn with_tracer_backend(mut self, backend: TracerBackend) -> Self {
        self.tracer_backend = backend;
        self
    }

    #[must_use]
    pub fn with_console_tracer(self) -> Self {
        self.with_tracer_backend(TracerBackend::Console)
    }

    #[must_use]
    pub fn with_memory_tracer(self) -> Self {
        self.with_tracer_backend(TracerBackend::Memory)
    }

    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Generates a fresh trace id for one flow invocation.
    #[must_use]
    pub fn new_trace_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Builds the configured tracer backend for `trace_id`.
    #[must_use]
    pub fn build_tracer(&self, trace_id: impl Into<String>) -> Arc<dyn Tracer> {
        let trace_id = trace_id.into();
        match self.tracer_backend {
            TracerBackend::Console => {
                Arc::new(ConsoleTracer::new(trace_id, self.service_name.clone()))
            }
            TracerBackend::Memory => {
                Arc::new(InMemoryTracer::new(trace_id, self.service_name.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_console_tracer_and_default_policy() {
        let config = FlowConfig::default();
        assert_eq!(config.tracer_backend, TracerBackend::Console);
        assert_eq!(config.default_policy, Policy::default());
    }

    #[test]
    fn with_memory_tracer_builds_an_in_memory_tracer() {
        let config = FlowConfig::new().with_memory_tracer();
        let tracer = config.build_tracer("trace-1");
        assert_eq!(tracer.trace_id(), "trace-1");
    }

    #[test]
    fn new_trace_id_is_unique_per_call() {
        let config = FlowConfig::new();
        assert_ne!(config.new_trace_id(), config.new_trace_id());
    }
}
