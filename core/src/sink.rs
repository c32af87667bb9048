//! Telemetry Sinks
//!
//! A sink accepts finalized spans. It is assumed non-blocking or internally
//! buffered; a sink failure must never reach the call path (the context wraps
//! the single record site in failure isolation).

use parking_lot::Mutex;

use crate::span::Span;

/// Receiver for finalized spans.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, span: Span);
}

/// Discards every span.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _span: Span) {}
}

/// Emits each span as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, span: Span) {
        tracing::info!(
            target: "wiretap::spans",
            id = %span.id(),
            kind = ?span.kind(),
            name = %span.name(),
            target_host = %span.target_host(),
            success = ?span.success(),
            result_code = ?span.result_code(),
            duration_ms = span.duration().map(|d| d.as_millis() as u64),
            "dependency call recorded"
        );
    }
}

/// Buffers spans in memory. The test double for the whole workspace.
#[derive(Debug, Default)]
pub struct MemorySink {
    spans: Mutex<Vec<Span>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.lock().is_empty()
    }

    /// Snapshot of everything recorded so far.
    pub fn spans(&self) -> Vec<Span> {
        self.spans.lock().clone()
    }

    /// Take all recorded spans, leaving the buffer empty.
    pub fn drain(&self) -> Vec<Span> {
        std::mem::take(&mut *self.spans.lock())
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, span: Span) {
        self.spans.lock().push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_tracing_sinks_accept_spans() {
        let mut span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        span.stop();
        NullSink.record(span.clone());
        TracingSink.record(span);
    }

    #[test]
    fn test_memory_sink_buffers_and_drains() {
        let sink = MemorySink::new();
        let mut span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        span.succeed();
        span.stop();
        sink.record(span);

        assert_eq!(sink.len(), 1);
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].success(), Some(true));
        assert!(sink.is_empty());
    }
}
