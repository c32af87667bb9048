//! In-Memory Channels
//!
//! In-process implementations of the three channel shapes. They are the test
//! double for the whole workspace and double as the semantic reference for
//! what a transport must do: honor the lifecycle state machine, raise
//! lifecycle events, and move envelopes without touching them.
//!
//! Failure modes are switchable so tests can drive every decorator outcome:
//! `set_fail_opens`, `set_fail_sends`, and a pluggable responder for
//! request/reply.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use wiretap_core::Envelope;

use crate::channel::{
    Channel, ChannelState, DuplexChannel, EndpointAddress, OutputChannel, RequestReplyChannel,
};
use crate::error::ChannelError;
use crate::events::{ChannelEvent, ChannelObserver, ObserverId, ObserverRegistry};
use crate::factory::{AnyChannel, ChannelFactory, ChannelShape};
use crate::handle::CallHandle;

/// Lifecycle plumbing shared by every in-memory shape.
struct CoreState {
    address: EndpointAddress,
    state: Mutex<ChannelState>,
    observers: ObserverRegistry,
    fail_opens: AtomicBool,
    fail_sends: AtomicBool,
}

impl CoreState {
    fn new(address: EndpointAddress) -> Arc<Self> {
        Arc::new(Self {
            address,
            state: Mutex::new(ChannelState::Created),
            observers: ObserverRegistry::new(),
            fail_opens: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        })
    }

    fn open(&self) -> Result<(), ChannelError> {
        if self.fail_opens.load(Ordering::SeqCst) {
            *self.state.lock() = ChannelState::Faulted;
            return Err(ChannelError::Transport("open refused".to_string()));
        }
        *self.state.lock() = ChannelState::Opened;
        self.observers.notify(ChannelEvent::Opened);
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        *self.state.lock() = ChannelState::Closed;
        self.observers.notify(ChannelEvent::Closed);
        Ok(())
    }

    fn abort(&self) {
        *self.state.lock() = ChannelState::Closed;
        self.observers.notify(ChannelEvent::Closed);
    }

    fn fault(&self) {
        *self.state.lock() = ChannelState::Faulted;
        self.observers.notify(ChannelEvent::Faulted);
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        match *self.state.lock() {
            ChannelState::Opened => Ok(()),
            _ => Err(ChannelError::NotOpen),
        }
    }

    fn check_send(&self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport("send refused".to_string()));
        }
        Ok(())
    }
}

macro_rules! impl_memory_lifecycle {
    ($ty:ty) => {
        #[async_trait]
        impl Channel for $ty {
            fn remote_address(&self) -> &EndpointAddress {
                &self.core.address
            }

            fn state(&self) -> ChannelState {
                *self.core.state.lock()
            }

            async fn open(&self) -> Result<(), ChannelError> {
                self.core.open()
            }

            fn begin_open(&self) -> CallHandle<()> {
                let core = Arc::clone(&self.core);
                CallHandle::issue(async move { core.open() }, |_| {})
            }

            async fn close(&self) -> Result<(), ChannelError> {
                self.core.close()
            }

            fn begin_close(&self) -> CallHandle<()> {
                let core = Arc::clone(&self.core);
                CallHandle::issue(async move { core.close() }, |_| {})
            }

            fn abort(&self) {
                self.core.abort();
            }

            fn subscribe(&self, observer: Arc<dyn ChannelObserver>) -> ObserverId {
                self.core.observers.subscribe(observer)
            }

            fn unsubscribe(&self, id: ObserverId) {
                self.core.observers.unsubscribe(id)
            }
        }

        impl $ty {
            pub fn set_fail_opens(&self, fail: bool) {
                self.core.fail_opens.store(fail, Ordering::SeqCst);
            }

            pub fn set_fail_sends(&self, fail: bool) {
                self.core.fail_sends.store(fail, Ordering::SeqCst);
            }

            /// Force the channel into the faulted state, raising the event.
            pub fn fault(&self) {
                self.core.fault();
            }

            /// Live lifecycle subscriptions. Used by hygiene tests.
            pub fn subscription_count(&self) -> usize {
                self.core.observers.len()
            }
        }
    };
}

// ============== Output ==============

#[derive(Clone)]
pub struct MemoryOutputChannel {
    core: Arc<CoreState>,
    sent: Arc<Mutex<Vec<Envelope>>>,
}

impl MemoryOutputChannel {
    pub fn new(address: EndpointAddress) -> Self {
        Self {
            core: CoreState::new(address),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }
}

impl_memory_lifecycle!(MemoryOutputChannel);

#[async_trait]
impl OutputChannel for MemoryOutputChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.core.check_send()?;
        self.sent.lock().push(envelope);
        Ok(())
    }

    fn begin_send(&self, envelope: Envelope) -> CallHandle<()> {
        let core = Arc::clone(&self.core);
        let sent = Arc::clone(&self.sent);
        CallHandle::issue(
            async move {
                core.check_send()?;
                sent.lock().push(envelope);
                Ok(())
            },
            |_| {},
        )
    }
}

// ============== Request-Reply ==============

type Responder = Arc<dyn Fn(&Envelope) -> Result<Envelope, ChannelError> + Send + Sync>;

#[derive(Clone)]
pub struct MemoryRequestReplyChannel {
    core: Arc<CoreState>,
    sent: Arc<Mutex<Vec<Envelope>>>,
    responder: Responder,
}

impl MemoryRequestReplyChannel {
    pub fn new(address: EndpointAddress) -> Self {
        Self {
            core: CoreState::new(address),
            sent: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(|request| {
                Ok(Envelope::reply_to(request.message_id().unwrap_or_default()))
            }),
        }
    }

    /// Replace the canned reply logic.
    pub fn with_responder(
        mut self,
        responder: impl Fn(&Envelope) -> Result<Envelope, ChannelError> + Send + Sync + 'static,
    ) -> Self {
        self.responder = Arc::new(responder);
        self
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().clone()
    }
}

impl_memory_lifecycle!(MemoryRequestReplyChannel);

#[async_trait]
impl RequestReplyChannel for MemoryRequestReplyChannel {
    async fn request(&self, envelope: Envelope) -> Result<Envelope, ChannelError> {
        self.core.check_send()?;
        let reply = (self.responder)(&envelope)?;
        self.sent.lock().push(envelope);
        Ok(reply)
    }

    fn begin_request(&self, envelope: Envelope) -> CallHandle<Envelope> {
        let core = Arc::clone(&self.core);
        let sent = Arc::clone(&self.sent);
        let responder = Arc::clone(&self.responder);
        CallHandle::issue(
            async move {
                core.check_send()?;
                let reply = responder(&envelope)?;
                sent.lock().push(envelope);
                Ok(reply)
            },
            |_| {},
        )
    }
}

// ============== Duplex ==============

struct DuplexIo {
    sent: Mutex<Vec<Envelope>>,
    incoming_tx: mpsc::UnboundedSender<Envelope>,
    incoming_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
}

#[derive(Clone)]
pub struct MemoryDuplexChannel {
    core: Arc<CoreState>,
    io: Arc<DuplexIo>,
}

impl MemoryDuplexChannel {
    pub fn new(address: EndpointAddress) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            core: CoreState::new(address),
            io: Arc::new(DuplexIo {
                sent: Mutex::new(Vec::new()),
                incoming_tx,
                incoming_rx: tokio::sync::Mutex::new(incoming_rx),
            }),
        }
    }

    /// Queue an envelope for the receive side, as the remote peer would.
    pub fn push_incoming(&self, envelope: Envelope) {
        let _ = self.io.incoming_tx.send(envelope);
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.io.sent.lock().clone()
    }
}

async fn duplex_recv(core: Arc<CoreState>, io: Arc<DuplexIo>) -> Result<Envelope, ChannelError> {
    core.ensure_open()?;
    let mut rx = io.incoming_rx.lock().await;
    rx.recv().await.ok_or(ChannelError::Closed)
}

impl_memory_lifecycle!(MemoryDuplexChannel);

#[async_trait]
impl DuplexChannel for MemoryDuplexChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.core.check_send()?;
        self.io.sent.lock().push(envelope);
        Ok(())
    }

    fn begin_send(&self, envelope: Envelope) -> CallHandle<()> {
        let core = Arc::clone(&self.core);
        let io = Arc::clone(&self.io);
        CallHandle::issue(
            async move {
                core.check_send()?;
                io.sent.lock().push(envelope);
                Ok(())
            },
            |_| {},
        )
    }

    async fn receive(&self) -> Result<Envelope, ChannelError> {
        duplex_recv(Arc::clone(&self.core), Arc::clone(&self.io)).await
    }

    fn try_receive(&self) -> Result<Option<Envelope>, ChannelError> {
        self.core.ensure_open()?;
        match self.io.incoming_rx.try_lock() {
            Ok(mut rx) => match rx.try_recv() {
                Ok(envelope) => Ok(Some(envelope)),
                Err(mpsc::error::TryRecvError::Empty) => Ok(None),
                Err(mpsc::error::TryRecvError::Disconnected) => Err(ChannelError::Closed),
            },
            // A blocking receive holds the lock; nothing for us right now.
            Err(_) => Ok(None),
        }
    }

    fn begin_receive(&self) -> CallHandle<Envelope> {
        let core = Arc::clone(&self.core);
        let io = Arc::clone(&self.io);
        CallHandle::issue(duplex_recv(core, io), |_| {})
    }
}

// ============== Factory ==============

/// Hands out clones of a prototype channel; every clone shares the same
/// underlying state, so tests keep the prototype to drive the remote side.
pub enum MemoryChannelFactory {
    Output(MemoryOutputChannel),
    RequestReply(MemoryRequestReplyChannel),
    Duplex(MemoryDuplexChannel),
}

#[async_trait]
impl ChannelFactory for MemoryChannelFactory {
    fn shape(&self) -> ChannelShape {
        match self {
            Self::Output(_) => ChannelShape::Output,
            Self::RequestReply(_) => ChannelShape::RequestReply,
            Self::Duplex(_) => ChannelShape::Duplex,
        }
    }

    async fn open(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn abort(&self) {}

    async fn create(&self, _address: &EndpointAddress) -> Result<AnyChannel, ChannelError> {
        let channel = match self {
            Self::Output(prototype) => AnyChannel::Output(Arc::new(prototype.clone())),
            Self::RequestReply(prototype) => AnyChannel::RequestReply(Arc::new(prototype.clone())),
            Self::Duplex(prototype) => AnyChannel::Duplex(Arc::new(prototype.clone())),
        };
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> EndpointAddress {
        EndpointAddress::new("mem://quotes:9000/svc")
    }

    #[tokio::test]
    async fn test_send_requires_open() {
        let channel = MemoryOutputChannel::new(address());
        let err = channel.send(Envelope::request("urn:quotes/Publish")).await;
        assert!(matches!(err, Err(ChannelError::NotOpen)));

        channel.open().await.unwrap();
        channel
            .send(Envelope::request("urn:quotes/Publish"))
            .await
            .unwrap();
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_duplex_receive_yields_pushed_envelopes() {
        let channel = MemoryDuplexChannel::new(address());
        channel.open().await.unwrap();

        channel.push_incoming(Envelope::reply_to("m1"));
        let received = channel.receive().await.unwrap();
        assert_eq!(received.relates_to(), Some("m1"));

        assert!(channel.try_receive().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_default_responder_relates_back() {
        let channel = MemoryRequestReplyChannel::new(address());
        channel.open().await.unwrap();

        let request = Envelope::request("urn:quotes/Get");
        let id = request.message_id().unwrap().to_string();
        let reply = channel.request(request).await.unwrap();
        assert_eq!(reply.relates_to(), Some(id.as_str()));
    }
}
