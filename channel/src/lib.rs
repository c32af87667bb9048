//! Channel decorators and async correlation for wiretap.
//!
//! Wrap a channel factory with [`InstrumentedChannelFactory`] and every
//! channel it creates transparently records one dependency span per cataloged
//! call - fire-and-forget, request/reply, or duplex - without the calling
//! code changing at all.

pub mod channel;
pub mod correlator;
pub(crate) mod decorator;
pub mod duplex;
pub mod error;
pub mod events;
pub mod factory;
pub mod handle;
pub mod memory;
pub mod output;
pub mod request_reply;

pub use channel::{
    Channel, ChannelState, DuplexChannel, EndpointAddress, OutputChannel, RequestReplyChannel,
};
pub use correlator::{ReplyCorrelator, TimeoutCallback};
pub use duplex::InstrumentedDuplexChannel;
pub use error::{ChannelError, CorrelatorError};
pub use events::{ChannelEvent, ChannelObserver, ObserverId, ObserverRegistry};
pub use factory::{AnyChannel, ChannelFactory, ChannelShape, InstrumentedChannelFactory};
pub use handle::CallHandle;
pub use output::InstrumentedOutputChannel;
pub use request_reply::InstrumentedRequestReplyChannel;
