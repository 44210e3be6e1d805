//! Opaque broadcast transport abstraction for the permissions tunnel.
//!
//! The two parties of the tunnel (an embedded frame and its embedder) can only
//! exchange text messages through a fire-and-forget, broadcast-style channel:
//! - no delivery guarantee
//! - no request/response correlation
//! - no connection concept
//!
//! This is the lowest layer. Everything else builds on the [`MessagePort`]
//! and [`MessageSource`] traits provided here.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{LossyPort, MemoryPort, MemoryWindow, DEFAULT_CAPACITY};
pub use traits::{Listener, MessagePort, MessageSource, PortHandle};
