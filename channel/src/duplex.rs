//! Duplex Shape Decorator
//!
//! Send and receive are fully decoupled; only the message id in the payload
//! ties a reply back to its send. One-way sends finalize like Output. Two-way
//! sends park their span in the reply correlator *before* the inner send is
//! issued - a reply may beat the send's own completion - and the span is
//! finalized later by the matching receive, by the reply timeout, or by the
//! send itself failing.
//!
//! Close and abort dispose the correlator: still-pending spans are dropped
//! unrecorded. Re-opening installs a fresh correlator.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use wiretap_core::{Envelope, TelemetryContext};

use crate::channel::{Channel, ChannelState, DuplexChannel, EndpointAddress};
use crate::correlator::ReplyCorrelator;
use crate::decorator::{InstrumentedBase, StartedCall, conclude_with_reply, send_outcome};
use crate::error::ChannelError;
use crate::events::{ChannelObserver, ObserverId};
use crate::handle::CallHandle;

/// Result code recorded when a two-way send's reply never arrives.
const NO_REPLY_CODE: &str = "no-reply";

pub struct InstrumentedDuplexChannel {
    inner: Arc<dyn DuplexChannel>,
    base: InstrumentedBase,
    pending: Mutex<Arc<ReplyCorrelator>>,
}

impl InstrumentedDuplexChannel {
    pub fn new(inner: Arc<dyn DuplexChannel>, context: Arc<TelemetryContext>) -> Self {
        let address = inner.remote_address().clone();
        let pending = Mutex::new(new_correlator(&context));
        Self {
            inner,
            base: InstrumentedBase::new(context, address),
            pending,
        }
    }

    fn correlator(&self) -> Arc<ReplyCorrelator> {
        Arc::clone(&self.pending.lock())
    }

    /// Pending entries from a previous open cycle died with its dispose; a
    /// re-opened channel gets a fresh correlator.
    fn refresh_correlator(&self) {
        let mut pending = self.pending.lock();
        if pending.is_disposed() {
            *pending = new_correlator(&self.base.context);
        }
    }

    fn settle_reply(&self, envelope: &Envelope) {
        settle_reply_with(&self.correlator(), &self.base.context, envelope);
    }
}

fn new_correlator(context: &Arc<TelemetryContext>) -> Arc<ReplyCorrelator> {
    let context = Arc::clone(context);
    ReplyCorrelator::new(Arc::new(move |_message_id, mut span| {
        span.mark_failure(NO_REPLY_CODE);
        context.finish(span);
    }))
}

/// Match an incoming envelope against the pending table. A hit finalizes that
/// span with the reply's fault status; a miss means the message belongs to
/// someone else and passes through untouched.
fn settle_reply_with(
    correlator: &Arc<ReplyCorrelator>,
    context: &TelemetryContext,
    envelope: &Envelope,
) {
    let Some(relates_to) = envelope.relates_to() else {
        return;
    };
    if let Some(mut span) = correlator.try_lookup(relates_to) {
        conclude_with_reply(&mut span, envelope);
        context.finish(span);
    }
}

#[async_trait]
impl Channel for InstrumentedDuplexChannel {
    fn remote_address(&self) -> &EndpointAddress {
        &self.base.address
    }

    fn state(&self) -> ChannelState {
        self.base.state()
    }

    async fn open(&self) -> Result<(), ChannelError> {
        self.refresh_correlator();
        self.base.open_channel(self.inner.as_ref()).await
    }

    fn begin_open(&self) -> CallHandle<()> {
        self.refresh_correlator();
        let span = self.base.start_open(self.inner.as_ref());
        let handle = self.inner.begin_open();
        self.base.wrap_open_handle(span, handle)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let result = self.base.close_channel(self.inner.as_ref()).await;
        self.correlator().dispose();
        result
    }

    fn begin_close(&self) -> CallHandle<()> {
        self.base.set_state(ChannelState::Closing);
        self.base.unhook(self.inner.as_ref());
        self.correlator().dispose();
        self.base.wrap_close_handle(self.inner.begin_close())
    }

    fn abort(&self) {
        self.correlator().dispose();
        self.base.abort_channel(self.inner.as_ref());
    }

    fn subscribe(&self, observer: Arc<dyn ChannelObserver>) -> ObserverId {
        self.base.observers.subscribe(observer)
    }

    fn unsubscribe(&self, id: ObserverId) {
        self.base.observers.unsubscribe(id)
    }
}

#[async_trait]
impl DuplexChannel for InstrumentedDuplexChannel {
    async fn send(&self, mut envelope: Envelope) -> Result<(), ChannelError> {
        let Some(StartedCall { mut span, one_way }) = self.base.start_call(&mut envelope) else {
            return self.inner.send(envelope).await;
        };

        if !one_way {
            if let Some(id) = envelope.message_id().map(str::to_string) {
                span.set_property("message_id", &id);
                let correlator = self.correlator();
                let timeout = self.base.context.config().reply_timeout();
                if let Err(err) = correlator.add(&id, span, timeout) {
                    tracing::warn!(
                        message_id = %id,
                        error = %err,
                        "could not track pending reply; span dropped"
                    );
                    return self.inner.send(envelope).await;
                }

                let result = self.inner.send(envelope).await;
                if let Err(e) = &result {
                    // The send itself failed; no reply will ever arrive.
                    // Reclaim the parked span and finalize it as this failure.
                    if let Some(mut span) = correlator.try_lookup(&id) {
                        span.mark_failure(e.result_code());
                        self.base.context.finish(span);
                    }
                }
                return result;
            }
            tracing::debug!(
                action = ?envelope.action(),
                "two-way send without message id; finalizing on send outcome"
            );
        }

        let result = self.inner.send(envelope).await;
        send_outcome(&mut span, &result);
        self.base.context.finish(span);
        result
    }

    fn begin_send(&self, mut envelope: Envelope) -> CallHandle<()> {
        let Some(StartedCall { mut span, one_way }) = self.base.start_call(&mut envelope) else {
            return self.inner.begin_send(envelope);
        };

        if !one_way {
            if let Some(id) = envelope.message_id().map(str::to_string) {
                span.set_property("message_id", &id);
                let correlator = self.correlator();
                let timeout = self.base.context.config().reply_timeout();
                if let Err(err) = correlator.add(&id, span, timeout) {
                    tracing::warn!(
                        message_id = %id,
                        error = %err,
                        "could not track pending reply; span dropped"
                    );
                    return self.inner.begin_send(envelope);
                }

                let handle = self.inner.begin_send(envelope);
                let context = Arc::clone(&self.base.context);
                return CallHandle::issue(async move { handle.join().await }, move |result| {
                    if let Err(e) = result {
                        if let Some(mut span) = correlator.try_lookup(&id) {
                            span.mark_failure(e.result_code());
                            context.finish(span);
                        }
                    }
                });
            }
            tracing::debug!(
                action = ?envelope.action(),
                "two-way send without message id; finalizing on send outcome"
            );
        }

        let handle = self.inner.begin_send(envelope);
        let context = Arc::clone(&self.base.context);
        CallHandle::issue(async move { handle.join().await }, move |result| {
            send_outcome(&mut span, result);
            context.finish(span);
        })
    }

    async fn receive(&self) -> Result<Envelope, ChannelError> {
        let result = self.inner.receive().await;
        if let Ok(envelope) = &result {
            self.settle_reply(envelope);
        }
        result
    }

    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError> {
        let result = self.inner.try_receive();
        if let Ok(Some(envelope)) = &result {
            self.settle_reply(envelope);
        }
        result
    }

    fn begin_receive(&self) -> CallHandle<Envelope> {
        let handle = self.inner.begin_receive();
        let correlator = self.correlator();
        let context = Arc::clone(&self.base.context);
        CallHandle::issue(async move { handle.join().await }, move |result| {
            if let Ok(envelope) = result {
                settle_reply_with(&correlator, &context, envelope);
            }
        })
    }
}
