//! Channel Decorator Base
//!
//! The shape-agnostic half of every instrumented channel: mirrored lifecycle
//! state, forwarding of inner lifecycle events to the decorator's own
//! observers, the catalog-gated span start with correlation-header injection,
//! and the open/close/abort instrumentation shared by all three shapes.
//!
//! The decorator never changes what the caller sees. Inner results and errors
//! pass through untouched; spans are a side observation.

use std::sync::Arc;

use parking_lot::Mutex;

use wiretap_core::{Envelope, Span, TelemetryContext};

use crate::channel::{Channel, ChannelState, EndpointAddress};
use crate::error::ChannelError;
use crate::events::{ChannelEvent, ChannelObserver, ObserverId, ObserverRegistry};
use crate::handle::CallHandle;

/// Re-raises the inner channel's lifecycle events to the decorator's
/// subscribers and keeps the mirrored state in step with faults.
struct EventForwarder {
    observers: Arc<ObserverRegistry>,
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelObserver for EventForwarder {
    fn on_event(&self, event: ChannelEvent) {
        if event == ChannelEvent::Faulted {
            *self.state.lock() = ChannelState::Faulted;
        }
        self.observers.notify(event);
    }
}

/// A catalog hit: the span to finalize plus the operation's reply expectation.
pub(crate) struct StartedCall {
    pub span: Span,
    pub one_way: bool,
}

/// Shared plumbing embedded in each shape decorator.
pub(crate) struct InstrumentedBase {
    pub(crate) context: Arc<TelemetryContext>,
    pub(crate) address: EndpointAddress,
    pub(crate) state: Arc<Mutex<ChannelState>>,
    pub(crate) observers: Arc<ObserverRegistry>,
    forward: Mutex<Option<ObserverId>>,
}

impl InstrumentedBase {
    pub(crate) fn new(context: Arc<TelemetryContext>, address: EndpointAddress) -> Self {
        Self {
            context,
            address,
            state: Arc::new(Mutex::new(ChannelState::Created)),
            observers: Arc::new(ObserverRegistry::new()),
            forward: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ChannelState) {
        *self.state.lock() = state;
    }

    /// Register the forwarding observer on the inner channel, replacing any
    /// stale registration from a previous open cycle.
    pub(crate) fn hook(&self, inner: &dyn Channel) {
        let mut forward = self.forward.lock();
        if let Some(stale) = forward.take() {
            inner.unsubscribe(stale);
        }
        let observer = Arc::new(EventForwarder {
            observers: Arc::clone(&self.observers),
            state: Arc::clone(&self.state),
        });
        *forward = Some(inner.subscribe(observer));
    }

    /// Remove the forwarding observer. Safe to call repeatedly; every
    /// close/abort path must end up here.
    pub(crate) fn unhook(&self, inner: &dyn Channel) {
        if let Some(id) = self.forward.lock().take() {
            inner.unsubscribe(id);
        }
    }

    /// Subscribe first, then start the open span. Shared by `open` and
    /// `begin_open`.
    pub(crate) fn start_open(&self, inner: &dyn Channel) -> Span {
        self.hook(inner);
        self.set_state(ChannelState::Opening);
        Span::channel_open(self.address.host())
    }

    pub(crate) async fn open_channel(&self, inner: &dyn Channel) -> Result<(), ChannelError> {
        let mut span = self.start_open(inner);
        let result = inner.open().await;
        open_outcome(&self.state, &mut span, &result);
        self.context.finish(span);
        result
    }

    /// Wrap the inner open handle so its completion settles state and
    /// finalizes the open span before the result is observable.
    pub(crate) fn wrap_open_handle(&self, span: Span, handle: CallHandle<()>) -> CallHandle<()> {
        let context = Arc::clone(&self.context);
        let state = Arc::clone(&self.state);
        CallHandle::issue(async move { handle.join().await }, move |result| {
            let mut span = span;
            open_outcome(&state, &mut span, result);
            context.finish(span);
        })
    }

    pub(crate) async fn close_channel(&self, inner: &dyn Channel) -> Result<(), ChannelError> {
        self.set_state(ChannelState::Closing);
        let result = inner.close().await;
        // Unhook unconditionally, success or failure, so repeated open/close
        // cycles never accumulate subscriptions.
        self.unhook(inner);
        self.set_state(ChannelState::Closed);
        result
    }

    /// For `begin_close` the unhook happens eagerly at issue time (the caller
    /// runs it); this wrapper only settles the mirrored state on completion.
    pub(crate) fn wrap_close_handle(&self, handle: CallHandle<()>) -> CallHandle<()> {
        let state = Arc::clone(&self.state);
        CallHandle::issue(async move { handle.join().await }, move |_result| {
            *state.lock() = ChannelState::Closed;
        })
    }

    pub(crate) fn abort_channel(&self, inner: &dyn Channel) {
        self.unhook(inner);
        self.set_state(ChannelState::Closed);
        inner.abort();
    }

    /// Catalog-gated span start for an outgoing call.
    ///
    /// A miss means the call is deliberately uninstrumented: no span, no
    /// header injection, plain pass-through.
    pub(crate) fn start_call(&self, envelope: &mut Envelope) -> Option<StartedCall> {
        let action = envelope.action()?;
        let Some(op) = self.context.catalog().lookup(action) else {
            tracing::debug!(action, "action not in catalog; proxying uninstrumented");
            return None;
        };

        let span = Span::remote_call(op.display_name.clone(), self.address.host(), action);
        self.context
            .config()
            .headers
            .inject(span.root_id(), &span.id().to_string(), envelope);
        Some(StartedCall {
            span,
            one_way: op.is_one_way,
        })
    }
}

fn open_outcome(
    state: &Mutex<ChannelState>,
    span: &mut Span,
    result: &Result<(), ChannelError>,
) {
    match result {
        Ok(()) => {
            *state.lock() = ChannelState::Opened;
            span.succeed();
        }
        Err(e) => {
            *state.lock() = ChannelState::Faulted;
            span.mark_failure(e.result_code());
        }
    }
}

/// Outcome of a fire-and-forget send: the send's own success or failure.
pub(crate) fn send_outcome(span: &mut Span, result: &Result<(), ChannelError>) {
    match result {
        Ok(()) => span.succeed(),
        Err(e) => span.mark_failure(e.result_code()),
    }
}

/// Outcome taken from a reply message: a protocol-level fault marks the call
/// failed even though the inner channel returned it without error.
pub(crate) fn conclude_with_reply(span: &mut Span, reply: &Envelope) {
    match &reply.fault {
        Some(fault) => span.mark_failure(format!("fault:{}", fault.code)),
        None => span.succeed(),
    }
}

/// Outcome of a request/reply exchange: thrown errors and fault replies both
/// count as failures.
pub(crate) fn reply_outcome(span: &mut Span, result: &Result<Envelope, ChannelError>) {
    match result {
        Ok(reply) => conclude_with_reply(span, reply),
        Err(e) => span.mark_failure(e.result_code()),
    }
}
