use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::Result;

/// The sending half of the transport: an opaque handle to the remote party's
/// message endpoint.
///
/// Posting is fire-and-forget. `Ok(())` means the message was handed to the
/// transport, not that anyone received it.
pub trait MessagePort: Send + Sync + fmt::Debug {
    /// Post a text message to the party behind this handle.
    fn post_message(&self, data: &str) -> Result<()>;
}

/// Shared, type-erased port handle.
pub type PortHandle = Arc<dyn MessagePort>;

/// The receiving half of the transport: the local party's inbound message
/// events.
///
/// Every listener observes every message posted after it was created, in
/// transport order. Messages posted while nobody listens are lost.
pub trait MessageSource: Send + Sync {
    /// Attach a new listener.
    fn listen(&self) -> Listener;
}

/// A single attached listener on a [`MessageSource`].
///
/// Dropping the listener detaches it.
#[derive(Debug)]
pub struct Listener {
    rx: broadcast::Receiver<Arc<str>>,
}

impl Listener {
    /// Wrap a broadcast receiver.
    pub fn new(rx: broadcast::Receiver<Arc<str>>) -> Self {
        Self { rx }
    }

    /// Wait for the next inbound message.
    ///
    /// Returns `None` once the source is gone. A listener that falls behind
    /// skips the overwritten messages, the same as a lossy transport would.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.rx.recv().await {
                Ok(data) => return Some(data),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "listener lagged; inbound messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
