/// Errors that can occur while encoding, decoding or exchanging messages.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] permtunnel_transport::TransportError),

    /// The inbound text is not a well-formed JSON message.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The message lacks the tunnel marker and belongs to someone else.
    #[error("message is not tunnel traffic")]
    NotTunnelTraffic,

    /// The `type` field names no known message kind.
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// A field required by the message kind is absent.
    #[error("{msg_type} message is missing field '{field}'")]
    MissingField {
        msg_type: String,
        field: &'static str,
    },

    /// The channel was closed while waiting for a message.
    #[error("channel closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
