//! Channel Abstractions - Three Call Shapes
//!
//! The un-instrumented channel surface the decorators wrap. Three shapes:
//!
//! * **Output** - fire-and-forget send, no reply ever.
//! * **Request-Reply** - one send, one reply, same call.
//! * **Duplex** - send and receive fully decoupled, matched only by the
//!   `relates_to` identifier carried in the payload.
//!
//! Every shape also exposes a handle-based flavor (`begin_*`) that returns a
//! [`CallHandle`] immediately; see the `handle` module. Implementations keep
//! their state behind `Arc`s internally so all methods take `&self` and
//! `begin_*` can move a `'static` future into the handle.

use std::sync::Arc;

use async_trait::async_trait;

use wiretap_core::Envelope;

use crate::error::ChannelError;
use crate::events::{ChannelObserver, ObserverId};
use crate::handle::CallHandle;

/// Where a channel points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAddress {
    uri: String,
}

impl EndpointAddress {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_empty(&self) -> bool {
        self.uri.is_empty()
    }

    /// The host (and port) portion, used as the span target.
    pub fn host(&self) -> &str {
        let rest = match self.uri.find("://") {
            Some(idx) => &self.uri[idx + 3..],
            None => &self.uri,
        };
        match rest.find('/') {
            Some(idx) => &rest[..idx],
            None => rest,
        }
    }
}

impl std::fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Channel lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Opening,
    Opened,
    Closing,
    Closed,
    Faulted,
}

/// Lifecycle surface common to every call shape.
#[async_trait]
pub trait Channel: Send + Sync {
    fn remote_address(&self) -> &EndpointAddress;

    fn state(&self) -> ChannelState;

    async fn open(&self) -> Result<(), ChannelError>;

    fn begin_open(&self) -> CallHandle<()>;

    async fn close(&self) -> Result<(), ChannelError>;

    fn begin_close(&self) -> CallHandle<()>;

    /// Tear the channel down immediately. Never fails, never blocks.
    fn abort(&self);

    fn subscribe(&self, observer: Arc<dyn ChannelObserver>) -> ObserverId;

    fn unsubscribe(&self, id: ObserverId);
}

/// Fire-and-forget send.
#[async_trait]
pub trait OutputChannel: Channel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    fn begin_send(&self, envelope: Envelope) -> CallHandle<()>;
}

/// Synchronous request/reply.
#[async_trait]
pub trait RequestReplyChannel: Channel {
    async fn request(&self, envelope: Envelope) -> Result<Envelope, ChannelError>;

    fn begin_request(&self, envelope: Envelope) -> CallHandle<Envelope>;
}

/// Free-running duplex: send and receive are independent; replies carry the
/// original `message_id` in their `relates_to` field.
#[async_trait]
pub trait DuplexChannel: Channel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    fn begin_send(&self, envelope: Envelope) -> CallHandle<()>;

    async fn receive(&self) -> Result<Envelope, ChannelError>;

    /// Non-blocking receive; `Ok(None)` when nothing is queued.
    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError>;

    fn begin_receive(&self) -> CallHandle<Envelope>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_host_parsing() {
        let address = EndpointAddress::new("net.tcp://quotes:9000/svc");
        assert_eq!(address.host(), "quotes:9000");
        assert_eq!(address.uri(), "net.tcp://quotes:9000/svc");
        assert_eq!(address.to_string(), "net.tcp://quotes:9000/svc");
        assert_eq!(EndpointAddress::new("quotes:9000").host(), "quotes:9000");
        assert_eq!(EndpointAddress::new("http://quotes/svc/v1").host(), "quotes");
        assert!(EndpointAddress::new("").is_empty());
    }
}
