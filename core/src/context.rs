//! Telemetry Context - Shared Catalog, Sink, and Configuration
//!
//! One `TelemetryContext` is shared (read-only) by every decorator a factory
//! creates. It is also the single finalization site: `finish` freezes a span's
//! duration and hands it to the sink exactly once, inside a failure-isolation
//! scope so a misbehaving sink can never disturb the call path it observes.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::catalog::OperationCatalog;
use crate::config::InstrumentationConfig;
use crate::sink::TelemetrySink;
use crate::span::Span;

pub struct TelemetryContext {
    catalog: Arc<OperationCatalog>,
    sink: Arc<dyn TelemetrySink>,
    config: InstrumentationConfig,
}

impl TelemetryContext {
    pub fn new(
        catalog: Arc<OperationCatalog>,
        sink: Arc<dyn TelemetrySink>,
        config: InstrumentationConfig,
    ) -> Self {
        Self {
            catalog,
            sink,
            config,
        }
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Finalize a span: freeze its duration and hand it to the sink.
    ///
    /// Consumes the span, so each span can be finalized at most once. Sink
    /// panics are caught and logged; telemetry failures never replace or mask
    /// the real call outcome.
    pub fn finish(&self, mut span: Span) {
        span.stop();
        let name = span.name().to_string();
        let sink = Arc::clone(&self.sink);
        if catch_unwind(AssertUnwindSafe(move || sink.record(span))).is_err() {
            tracing::warn!(span = %name, "telemetry sink failed; span dropped");
        }
    }
}

impl std::fmt::Debug for TelemetryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryContext")
            .field("operations", &self.catalog.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationDescriptor;
    use crate::sink::MemorySink;

    fn context_with(sink: Arc<dyn TelemetrySink>) -> TelemetryContext {
        let catalog = Arc::new(OperationCatalog::from_contract(vec![
            OperationDescriptor::new("urn:quotes/Get", "GetQuote"),
        ]));
        TelemetryContext::new(catalog, sink, InstrumentationConfig::default())
    }

    #[test]
    fn test_finish_stops_and_records() {
        let sink = Arc::new(MemorySink::new());
        let context = context_with(sink.clone());

        let mut span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        span.succeed();
        context.finish(span);

        let recorded = sink.drain();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].is_stopped());
        assert_eq!(recorded[0].success(), Some(true));
    }

    #[test]
    fn test_sink_panic_is_isolated() {
        struct PanickingSink;
        impl TelemetrySink for PanickingSink {
            fn record(&self, _span: Span) {
                panic!("sink exploded");
            }
        }

        let context = context_with(Arc::new(PanickingSink));
        let span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        // Must not propagate the panic.
        context.finish(span);
    }
}
