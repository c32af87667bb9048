//! Span - Timed Dependency Call Record
//!
//! A `Span` is one timed record of a single outbound call: when it started,
//! how long it took, where it went, and how it ended. A Span is created when a
//! call begins and handed to the telemetry sink exactly once; hand-off consumes
//! the Span by value, so a second finalization does not compile.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// What kind of call a Span measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpanKind {
    /// Opening a channel to the remote endpoint.
    ChannelOpen,
    /// An actual remote operation invocation.
    RemoteCall,
}

/// A timed record of a single remote call's outcome.
///
/// `success` stays `None` until the owning path decides the outcome;
/// fire-and-forget sends that were accepted finalize with `Some(true)`.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    id: Uuid,
    root_id: String,
    name: String,
    target_host: String,
    kind: SpanKind,
    payload_label: String,
    properties: BTreeMap<String, String>,
    success: Option<bool>,
    result_code: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(skip)]
    begun: Instant,
    duration: Option<Duration>,
}

impl Span {
    /// Start a `RemoteCall` span for a cataloged operation.
    pub fn remote_call(
        name: impl Into<String>,
        target_host: impl Into<String>,
        payload_label: impl Into<String>,
    ) -> Self {
        Self::start(SpanKind::RemoteCall, name.into(), target_host.into(), payload_label.into())
    }

    /// Start a `ChannelOpen` span against the given endpoint.
    pub fn channel_open(target_host: impl Into<String>) -> Self {
        let host = target_host.into();
        Self::start(SpanKind::ChannelOpen, "Open".to_string(), host, String::new())
    }

    fn start(kind: SpanKind, name: String, target_host: String, payload_label: String) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            root_id: id.to_string(),
            name,
            target_host,
            kind,
            payload_label,
            properties: BTreeMap::new(),
            success: None,
            result_code: None,
            started_at: Utc::now(),
            begun: Instant::now(),
            duration: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The correlation root for this call tree. Defaults to the span's own id.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    /// Adopt an ambient operation root (e.g. an inbound request id).
    pub fn set_root_id(&mut self, root_id: impl Into<String>) {
        self.root_id = root_id.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_host(&self) -> &str {
        &self.target_host
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn payload_label(&self) -> &str {
        &self.payload_label
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn success(&self) -> Option<bool> {
        self.success
    }

    pub fn result_code(&self) -> Option<&str> {
        self.result_code.as_deref()
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Mark the call successful.
    pub fn succeed(&mut self) {
        self.success = Some(true);
    }

    /// Mark the call failed with a classification code.
    pub fn mark_failure(&mut self, result_code: impl Into<String>) {
        self.success = Some(false);
        self.result_code = Some(result_code.into());
    }

    /// Freeze the duration. The first call wins; later calls are no-ops.
    pub fn stop(&mut self) {
        if self.duration.is_none() {
            self.duration = Some(self.begun.elapsed());
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.duration.is_some()
    }

    /// The frozen duration, if `stop` has run.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_call_starts_unresolved() {
        let span = Span::remote_call("GetQuote", "quotes.example.com", "urn:quotes/Get");
        assert_eq!(span.kind(), SpanKind::RemoteCall);
        assert_eq!(span.success(), None);
        assert_eq!(span.result_code(), None);
        assert!(!span.is_stopped());
        assert_eq!(span.root_id(), span.id().to_string());
    }

    #[test]
    fn test_stop_freezes_duration_once() {
        let mut span = Span::channel_open("quotes.example.com");
        span.stop();
        let first = span.duration().expect("stopped");
        std::thread::sleep(Duration::from_millis(5));
        span.stop();
        assert_eq!(span.duration(), Some(first));
    }

    #[test]
    fn test_mark_failure_sets_code() {
        let mut span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        span.mark_failure("timeout");
        assert_eq!(span.success(), Some(false));
        assert_eq!(span.result_code(), Some("timeout"));
    }

    #[test]
    fn test_adopting_an_ambient_root() {
        let mut span = Span::remote_call("GetQuote", "q", "urn:quotes/Get");
        span.set_root_id("inbound-request-17");
        span.set_property("caller", "billing");
        assert_eq!(span.root_id(), "inbound-request-17");
        assert_eq!(span.properties().get("caller").map(String::as_str), Some("billing"));
    }
}
