//! Channel Factory Decorator
//!
//! Wraps an inner channel factory for one call shape. Every channel the inner
//! factory produces comes back wrapped in the matching shape decorator,
//! sharing one `TelemetryContext`. Factory lifecycle itself is a pure
//! pass-through - creating or closing a factory is not a remote call.
//!
//! Shapes are a closed set of tagged variants selected at construction time;
//! there is no runtime shape sniffing.

use std::sync::Arc;

use async_trait::async_trait;

use wiretap_core::TelemetryContext;

use crate::channel::{DuplexChannel, EndpointAddress, OutputChannel, RequestReplyChannel};
use crate::duplex::InstrumentedDuplexChannel;
use crate::error::ChannelError;
use crate::output::InstrumentedOutputChannel;
use crate::request_reply::InstrumentedRequestReplyChannel;

/// The three call shapes a factory can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelShape {
    Output,
    RequestReply,
    Duplex,
}

impl std::fmt::Display for ChannelShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Output => "output",
            Self::RequestReply => "request-reply",
            Self::Duplex => "duplex",
        };
        f.write_str(name)
    }
}

/// A channel of any shape, tagged.
pub enum AnyChannel {
    Output(Arc<dyn OutputChannel>),
    RequestReply(Arc<dyn RequestReplyChannel>),
    Duplex(Arc<dyn DuplexChannel>),
}

impl AnyChannel {
    pub fn shape(&self) -> ChannelShape {
        match self {
            Self::Output(_) => ChannelShape::Output,
            Self::RequestReply(_) => ChannelShape::RequestReply,
            Self::Duplex(_) => ChannelShape::Duplex,
        }
    }

    pub fn into_output(self) -> Result<Arc<dyn OutputChannel>, ChannelError> {
        match self {
            Self::Output(channel) => Ok(channel),
            other => Err(shape_mismatch(ChannelShape::Output, other.shape())),
        }
    }

    pub fn into_request_reply(self) -> Result<Arc<dyn RequestReplyChannel>, ChannelError> {
        match self {
            Self::RequestReply(channel) => Ok(channel),
            other => Err(shape_mismatch(ChannelShape::RequestReply, other.shape())),
        }
    }

    pub fn into_duplex(self) -> Result<Arc<dyn DuplexChannel>, ChannelError> {
        match self {
            Self::Duplex(channel) => Ok(channel),
            other => Err(shape_mismatch(ChannelShape::Duplex, other.shape())),
        }
    }
}

fn shape_mismatch(expected: ChannelShape, actual: ChannelShape) -> ChannelError {
    ChannelError::UnsupportedShape {
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Produces channels of one shape for a given endpoint.
#[async_trait]
pub trait ChannelFactory: Send + Sync {
    fn shape(&self) -> ChannelShape;

    async fn open(&self) -> Result<(), ChannelError>;

    async fn close(&self) -> Result<(), ChannelError>;

    fn abort(&self);

    async fn create(&self, address: &EndpointAddress) -> Result<AnyChannel, ChannelError>;
}

/// Decorates an inner factory so every created channel is instrumented.
pub struct InstrumentedChannelFactory<F> {
    inner: F,
    context: Arc<TelemetryContext>,
}

impl<F: ChannelFactory> InstrumentedChannelFactory<F> {
    pub fn new(inner: F, context: Arc<TelemetryContext>) -> Self {
        Self { inner, context }
    }

    pub fn context(&self) -> &Arc<TelemetryContext> {
        &self.context
    }
}

#[async_trait]
impl<F: ChannelFactory> ChannelFactory for InstrumentedChannelFactory<F> {
    fn shape(&self) -> ChannelShape {
        self.inner.shape()
    }

    async fn open(&self) -> Result<(), ChannelError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.inner.close().await
    }

    fn abort(&self) {
        self.inner.abort();
    }

    async fn create(&self, address: &EndpointAddress) -> Result<AnyChannel, ChannelError> {
        if address.is_empty() {
            return Err(ChannelError::invalid_argument("address must not be empty"));
        }

        let channel = self.inner.create(address).await?;
        if channel.shape() != self.inner.shape() {
            return Err(shape_mismatch(self.inner.shape(), channel.shape()));
        }

        let wrapped = match channel {
            AnyChannel::Output(inner) => AnyChannel::Output(Arc::new(
                InstrumentedOutputChannel::new(inner, Arc::clone(&self.context)),
            )),
            AnyChannel::RequestReply(inner) => AnyChannel::RequestReply(Arc::new(
                InstrumentedRequestReplyChannel::new(inner, Arc::clone(&self.context)),
            )),
            AnyChannel::Duplex(inner) => AnyChannel::Duplex(Arc::new(
                InstrumentedDuplexChannel::new(inner, Arc::clone(&self.context)),
            )),
        };
        Ok(wrapped)
    }
}
