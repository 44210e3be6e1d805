use std::time::Duration;

use crate::tunnel::Role;

/// Errors that can occur in tunnel operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] permtunnel_transport::TransportError),

    /// Message channel error.
    #[error("channel error: {0}")]
    Channel(#[from] permtunnel_channel::ChannelError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A bounded wait exceeded its deadline.
    #[error("TIMEOUT after {0:?}")]
    Timeout(Duration),

    /// A method call named no forwardable method.
    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    /// A method call carried arguments the method cannot accept.
    #[error("invalid arguments for '{method}': {reason}")]
    InvalidArguments { method: String, reason: String },

    /// The operation is only available on the other side of the tunnel.
    #[error("{operation} is not available on the {role} side")]
    WrongRole {
        operation: &'static str,
        role: Role,
    },

    /// `forward_to` was already called on this tunnel.
    #[error("tunnel is already forwarding to a frame")]
    AlreadyForwarding,
}

pub type Result<T> = std::result::Result<T, PeerError>;
