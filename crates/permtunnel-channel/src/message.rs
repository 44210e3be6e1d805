use std::borrow::Cow;

use serde_json::Value;

use crate::id::generate_id;
use crate::kind::{
    callback_type, HANDSHAKE, HANDSHAKE_ACK, METHOD_CALL, METHOD_CALL_RESPONSE, WILDCARD,
};

/// Typed body of a tunnel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Connection probe sent by the embedder.
    Handshake,
    /// Frame's acknowledgement of a handshake.
    HandshakeAck,
    /// Request to run `method` with `args` on the embedder.
    MethodCall { method: String, args: Vec<Value> },
    /// Reply to a method call. `result` is present even when it is `null`.
    MethodCallResponse { result: Value },
    /// A captured sensor event relayed to the other party.
    EventCallback {
        event_type: String,
        args: Vec<Value>,
    },
}

impl Payload {
    /// Wire `type` of this payload.
    pub fn msg_type(&self) -> Cow<'static, str> {
        match self {
            Payload::Handshake => Cow::Borrowed(HANDSHAKE),
            Payload::HandshakeAck => Cow::Borrowed(HANDSHAKE_ACK),
            Payload::MethodCall { .. } => Cow::Borrowed(METHOD_CALL),
            Payload::MethodCallResponse { .. } => Cow::Borrowed(METHOD_CALL_RESPONSE),
            Payload::EventCallback { event_type, .. } => Cow::Owned(callback_type(event_type)),
        }
    }
}

/// A tunnel message: correlation id plus typed payload.
///
/// The tunnel marker is implied; [`crate::codec::encode`] always writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub payload: Payload,
}

impl Message {
    /// Message without an id; one is generated when it is sent.
    pub fn new(payload: Payload) -> Self {
        Self { id: None, payload }
    }

    /// Message with an explicit id (used to echo a request's id).
    pub fn with_id(id: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Some(id.into()),
            payload,
        }
    }

    /// Create a handshake.
    pub fn handshake() -> Self {
        Self::new(Payload::Handshake)
    }

    /// Create a handshake acknowledgement.
    pub fn handshake_ack() -> Self {
        Self::new(Payload::HandshakeAck)
    }

    /// Create a method call.
    pub fn method_call(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(Payload::MethodCall {
            method: method.into(),
            args,
        })
    }

    /// Create the reply to the call identified by `id`.
    pub fn method_call_response(id: impl Into<String>, result: Value) -> Self {
        Self::with_id(id, Payload::MethodCallResponse { result })
    }

    /// Create a forwarded event.
    pub fn event_callback(event_type: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(Payload::EventCallback {
            event_type: event_type.into(),
            args,
        })
    }

    /// Wire `type` of this message.
    pub fn msg_type(&self) -> Cow<'static, str> {
        self.payload.msg_type()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Return the message id, generating and attaching one if absent.
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_id)
    }
}

/// Which inbound messages a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    /// Every tunnel message (`*`).
    Any,
    /// Messages whose wire `type` equals the given value.
    Exact(String),
}

impl TypeFilter {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Exact(msg_type) => message.msg_type() == msg_type.as_str(),
        }
    }
}

impl From<&str> for TypeFilter {
    fn from(value: &str) -> Self {
        if value == WILDCARD {
            TypeFilter::Any
        } else {
            TypeFilter::Exact(value.to_string())
        }
    }
}

impl From<String> for TypeFilter {
    fn from(value: String) -> Self {
        if value == WILDCARD {
            TypeFilter::Any
        } else {
            TypeFilter::Exact(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ensure_id_generates_once() {
        let mut message = Message::handshake();
        assert!(message.id().is_none());

        let first = message.ensure_id().to_string();
        let second = message.ensure_id().to_string();
        assert_eq!(first, second);
        assert_eq!(message.id(), Some(first.as_str()));
    }

    #[test]
    fn ensure_id_keeps_existing() {
        let mut message = Message::method_call_response("abc", json!(true));
        assert_eq!(message.ensure_id(), "abc");
    }

    #[test]
    fn wildcard_filter_matches_everything() {
        let filter = TypeFilter::from("*");
        assert_eq!(filter, TypeFilter::Any);
        assert!(filter.matches(&Message::handshake()));
        assert!(filter.matches(&Message::event_callback("devicemotion", vec![])));
    }

    #[test]
    fn exact_filter_matches_callback_types() {
        let filter = TypeFilter::from("deviceorientation-callback");
        assert!(filter.matches(&Message::event_callback("deviceorientation", vec![])));
        assert!(!filter.matches(&Message::event_callback("devicemotion", vec![])));
        assert!(!filter.matches(&Message::handshake()));
    }
}
