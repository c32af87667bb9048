//! Output Shape - Fire-and-Forget Decorator
//!
//! No reply is ever awaited: the span is finalized immediately with the
//! send's own success or failure.

use std::sync::Arc;

use async_trait::async_trait;

use wiretap_core::{Envelope, TelemetryContext};

use crate::channel::{Channel, ChannelState, EndpointAddress, OutputChannel};
use crate::decorator::{InstrumentedBase, StartedCall, send_outcome};
use crate::error::ChannelError;
use crate::events::{ChannelObserver, ObserverId};
use crate::handle::CallHandle;

pub struct InstrumentedOutputChannel {
    inner: Arc<dyn OutputChannel>,
    base: InstrumentedBase,
}

impl InstrumentedOutputChannel {
    pub fn new(inner: Arc<dyn OutputChannel>, context: Arc<TelemetryContext>) -> Self {
        let address = inner.remote_address().clone();
        Self {
            inner,
            base: InstrumentedBase::new(context, address),
        }
    }
}

#[async_trait]
impl Channel for InstrumentedOutputChannel {
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
impl OutputChannel for InstrumentedOutputChannel {
    async fn send(&self, mut envelope: Envelope) -> Result<(), ChannelError> {
        match self.base.start_call(&mut envelope) {
            None => self.inner.send(envelope).await,
            Some(StartedCall { mut span, .. }) => {
                let result = self.inner.send(envelope).await;
                send_outcome(&mut span, &result);
                self.base.context.finish(span);
                result
            }
        }
    }

    fn begin_send(&self, mut envelope: Envelope) -> CallHandle<()> {
        match self.base.start_call(&mut envelope) {
            None => self.inner.begin_send(envelope),
            Some(StartedCall { span, .. }) => {
                let handle = self.inner.begin_send(envelope);
                let context = Arc::clone(&self.base.context);
                CallHandle::issue(async move { handle.join().await }, move |result| {
                    let mut span = span;
                    send_outcome(&mut span, result);
                    context.finish(span);
                })
            }
        }
    }
}
