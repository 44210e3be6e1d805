//! Permission-gated sensor events across an embedding boundary.
//!
//! An embedder hosts a frame and owns the platform's permission prompts and
//! sensors. The frame asks for permissions and receives sensor events as if
//! they were local; the tunnel forwards the calls and relays the events.
//!
//! # Crate Structure
//!
//! - [`transport`]: opaque broadcast message transport and in-memory windows
//! - [`channel`]: tagged JSON messages, type filtering and reply correlation
//! - [`peer`]: handshake, method forwarding, permission state and the [`Tunnel`]
//!
//! [`Tunnel`]: peer::Tunnel

/// Re-export transport types.
pub mod transport {
    pub use permtunnel_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use permtunnel_channel::*;
}

/// Re-export peer types.
pub mod peer {
    pub use permtunnel_peer::*;
}
