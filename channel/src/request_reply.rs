//! Request-Reply Shape Decorator
//!
//! The span's outcome honors the reply's fault status in addition to any
//! returned error: a protocol-level fault reply marks the call failed even
//! though the inner channel handed it back without an error.

use std::sync::Arc;

use async_trait::async_trait;

use wiretap_core::{Envelope, TelemetryContext};

use crate::channel::{Channel, ChannelState, EndpointAddress, RequestReplyChannel};
use crate::decorator::{InstrumentedBase, StartedCall, reply_outcome};
use crate::error::ChannelError;
use crate::events::{ChannelObserver, ObserverId};
use crate::handle::CallHandle;

pub struct InstrumentedRequestReplyChannel {
    inner: Arc<dyn RequestReplyChannel>,
    base: InstrumentedBase,
}

impl InstrumentedRequestReplyChannel {
    pub fn new(inner: Arc<dyn RequestReplyChannel>, context: Arc<TelemetryContext>) -> Self {
        let address = inner.remote_address().clone();
        Self {
            inner,
            base: InstrumentedBase::new(context, address),
        }
    }
}

#[async_trait]
impl Channel for InstrumentedRequestReplyChannel {
    fn remote_address(&self) -> &EndpointAddress {
        &self.base.address
    }

    fn state(&self) -> ChannelState {
        self.base.state()
    }

    async fn open(&self) -> Result<(), ChannelError> {
        self.base.open_channel(self.inner.as_ref()).await
    }

    fn begin_open(&self) -> CallHandle<()> {
        let span = self.base.start_open(self.inner.as_ref());
        let handle = self.inner.begin_open();
        self.base.wrap_open_handle(span, handle)
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.base.close_channel(self.inner.as_ref()).await
    }

    fn begin_close(&self) -> CallHandle<()> {
        self.base.set_state(ChannelState::Closing);
        self.base.unhook(self.inner.as_ref());
        self.base.wrap_close_handle(self.inner.begin_close())
    }

    fn abort(&self) {
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
impl RequestReplyChannel for InstrumentedRequestReplyChannel {
    async fn request(&self, mut envelope: Envelope) -> Result<Envelope, ChannelError> {
        match self.base.start_call(&mut envelope) {
            None => self.inner.request(envelope).await,
            Some(StartedCall { mut span, .. }) => {
                let result = self.inner.request(envelope).await;
                reply_outcome(&mut span, &result);
                self.base.context.finish(span);
                result
            }
        }
    }

    fn begin_request(&self, mut envelope: Envelope) -> CallHandle<Envelope> {
        match self.base.start_call(&mut envelope) {
            None => self.inner.begin_request(envelope),
            Some(StartedCall { span, .. }) => {
                let handle = self.inner.begin_request(envelope);
                let context = Arc::clone(&self.base.context);
                CallHandle::issue(async move { handle.join().await }, move |result| {
                    let mut span = span;
                    reply_outcome(&mut span, result);
                    context.finish(span);
                })
            }
        }
    }
}
