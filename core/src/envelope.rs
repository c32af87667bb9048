//! Envelope - Transport-Agnostic Message
//!
//! The abstract outgoing/incoming message the decorators proxy. Only the
//! fields the instrumentation needs are modeled: the action (catalog key), the
//! duplex correlation identifiers, a fault marker for protocol-level failure
//! replies, and the two header bags. The body rides along untouched.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::headers::HeaderBag;

/// A protocol-level fault carried by a reply message.
///
/// A fault reply is a *successful* transport exchange whose payload reports a
/// remote failure; request/reply and duplex receive treat it as a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInfo {
    pub code: String,
    pub reason: String,
}

impl FaultInfo {
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

/// One message crossing a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// The outgoing call identifier; the catalog key.
    pub action: Option<String>,
    /// Unique id of this message; duplex replies reference it via `relates_to`.
    pub message_id: Option<String>,
    /// For replies: the `message_id` of the message being answered.
    pub relates_to: Option<String>,
    /// Set when this message is a protocol-level fault reply.
    pub fault: Option<FaultInfo>,
    /// Transport-level headers.
    pub transport_headers: HeaderBag,
    /// Payload-level named headers, namespace-qualified.
    pub named_headers: HeaderBag,
    /// Opaque payload.
    pub body: serde_json::Value,
}

impl Envelope {
    /// A new outgoing request with a fresh message id.
    pub fn request(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            message_id: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// A reply answering the message with the given id.
    pub fn reply_to(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(Uuid::new_v4().to_string()),
            relates_to: Some(message_id.into()),
            ..Self::default()
        }
    }

    /// A fault reply answering the message with the given id.
    pub fn fault_reply_to(message_id: impl Into<String>, fault: FaultInfo) -> Self {
        let mut reply = Self::reply_to(message_id);
        reply.fault = Some(fault);
        reply
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn is_fault(&self) -> bool {
        self.fault.is_some()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn relates_to(&self) -> Option<&str> {
        self.relates_to.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_gets_message_id() {
        let envelope = Envelope::request("urn:quotes/Get");
        assert_eq!(envelope.action(), Some("urn:quotes/Get"));
        assert!(envelope.message_id().is_some());
        assert!(envelope.relates_to().is_none());
        assert!(!envelope.is_fault());
    }

    #[test]
    fn test_fault_reply_relates_back() {
        let request = Envelope::request("urn:quotes/Get");
        let id = request.message_id().unwrap().to_string();
        let reply = Envelope::fault_reply_to(&id, FaultInfo::new("Receiver", "boom"));
        assert_eq!(reply.relates_to(), Some(id.as_str()));
        assert!(reply.is_fault());
    }
}
