//! Wire-level message type names.

/// Marker field identifying tunnel traffic on a shared transport.
pub const TUNNEL_MARKER: &str = "_iframe_permissions_tunnel";

/// Embedder → frame, repeated until acknowledged.
pub const HANDSHAKE: &str = "handshake";

/// Frame → embedder, once per received handshake.
pub const HANDSHAKE_ACK: &str = "handshake-ack";

/// Frame → embedder: invoke a forwarded method.
pub const METHOD_CALL: &str = "method-call";

/// Embedder → frame: result of a forwarded method, echoing the call's `id`.
pub const METHOD_CALL_RESPONSE: &str = "method-call-response";

/// Suffix of forwarded sensor event types (`deviceorientation-callback`).
pub const CALLBACK_SUFFIX: &str = "-callback";

/// Subscription filter matching every tunnel message.
pub const WILDCARD: &str = "*";

/// Wire type carrying forwarded events of `event_type`.
pub fn callback_type(event_type: &str) -> String {
    format!("{event_type}{CALLBACK_SUFFIX}")
}

/// Extract the event type from a forwarded-event wire type.
pub fn event_type_of_callback(msg_type: &str) -> Option<&str> {
    msg_type
        .strip_suffix(CALLBACK_SUFFIX)
        .filter(|event_type| !event_type.is_empty())
}
