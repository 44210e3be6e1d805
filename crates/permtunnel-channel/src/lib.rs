//! Tagged JSON messages over the tunnel transport.
//!
//! Every message on the wire is a JSON object carrying:
//! - the `_iframe_permissions_tunnel: true` marker, separating tunnel traffic
//!   from anything else sharing the transport
//! - a `type` string selecting the handler
//! - a string `id` correlating a request with its reply
//!
//! [`MessageChannel`] adds type-filtered subscriptions and
//! send-and-await-reply on top of the fire-and-forget transport.

pub mod channel;
pub mod codec;
pub mod error;
pub mod id;
pub mod kind;
pub mod message;

pub use channel::{Inbox, MessageChannel, Subscription};
pub use codec::{decode, encode};
pub use error::{ChannelError, Result};
pub use id::{generate_id, ID_SEGMENTS};
pub use kind::{
    callback_type, event_type_of_callback, CALLBACK_SUFFIX, HANDSHAKE, HANDSHAKE_ACK,
    METHOD_CALL, METHOD_CALL_RESPONSE, TUNNEL_MARKER, WILDCARD,
};
pub use message::{Message, Payload, TypeFilter};
