use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::{Result, TransportError};
use crate::traits::{Listener, MessagePort, MessageSource, PortHandle};

/// Default number of in-flight messages a window buffers per listener.
pub const DEFAULT_CAPACITY: usize = 256;

/// In-process stand-in for a browsing context's message event target.
///
/// Messages posted through any of the window's ports are broadcast to every
/// listener attached at the time of posting.
#[derive(Clone)]
pub struct MemoryWindow {
    name: Arc<str>,
    tx: broadcast::Sender<Arc<str>>,
    closed: Arc<AtomicBool>,
}

impl MemoryWindow {
    /// Create a window with the default buffer capacity.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    /// Create a window buffering up to `capacity` messages per listener.
    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            name: Arc::from(name.into()),
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Window name, used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle other parties use to post into this window.
    pub fn port(&self) -> PortHandle {
        Arc::new(MemoryPort {
            name: self.name.clone(),
            tx: self.tx.clone(),
            closed: self.closed.clone(),
        })
    }

    /// Tear the window down: its ports reject every later post.
    ///
    /// Listeners already attached stay attached but receive nothing more.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of currently attached listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl MessageSource for MemoryWindow {
    fn listen(&self) -> Listener {
        Listener::new(self.tx.subscribe())
    }
}

impl fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("name", &self.name)
            .field("listeners", &self.tx.receiver_count())
            .finish()
    }
}

/// Posting handle for a [`MemoryWindow`].
#[derive(Clone)]
pub struct MemoryPort {
    name: Arc<str>,
    tx: broadcast::Sender<Arc<str>>,
    closed: Arc<AtomicBool>,
}

impl MessagePort for MemoryPort {
    fn post_message(&self, data: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed(self.name.to_string()));
        }
        match self.tx.send(Arc::from(data)) {
            Ok(listeners) => {
                tracing::trace!(target_window = %self.name, listeners, "message posted");
            }
            Err(_) => {
                tracing::trace!(
                    target_window = %self.name,
                    "no listeners attached; message dropped"
                );
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPort").field("name", &self.name).finish()
    }
}

/// Port wrapper that silently drops a deterministic subset of messages.
///
/// Models the best-effort delivery the tunnel protocol has to tolerate.
pub struct LossyPort {
    inner: PortHandle,
    drop_first: usize,
    drop_every: Option<usize>,
    posted: AtomicUsize,
    dropped: AtomicUsize,
}

impl LossyPort {
    /// Drop the first `count` messages, deliver the rest.
    pub fn drop_first(inner: PortHandle, count: usize) -> Self {
        Self {
            inner,
            drop_first: count,
            drop_every: None,
            posted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Drop every `nth` message (the nth, 2nth, ...). `nth == 0` drops nothing.
    pub fn drop_every(inner: PortHandle, nth: usize) -> Self {
        Self {
            inner,
            drop_first: 0,
            drop_every: (nth > 0).then_some(nth),
            posted: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Number of messages swallowed so far.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self, seq: usize) -> bool {
        if seq <= self.drop_first {
            return true;
        }
        matches!(self.drop_every, Some(nth) if seq % nth == 0)
    }
}

impl MessagePort for LossyPort {
    fn post_message(&self, data: &str) -> Result<()> {
        let seq = self.posted.fetch_add(1, Ordering::Relaxed) + 1;
        if self.should_drop(seq) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(seq, "lossy port dropped message");
            return Ok(());
        }
        self.inner.post_message(data)
    }
}

impl fmt::Debug for LossyPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LossyPort")
            .field("inner", &self.inner)
            .field("drop_first", &self.drop_first)
            .field("drop_every", &self.drop_every)
            .field("dropped", &self.dropped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_listener() {
        let window = MemoryWindow::new("top");
        let mut first = window.listen();
        let mut second = window.listen();

        window.port().post_message("hello").unwrap();

        assert_eq!(first.recv().await.as_deref(), Some("hello"));
        assert_eq!(second.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn post_without_listeners_is_lost_not_failed() {
        let window = MemoryWindow::new("frame");
        window.port().post_message("early").unwrap();

        let mut late = window.listen();
        window.port().post_message("late").unwrap();

        assert_eq!(late.recv().await.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn dropped_listener_detaches() {
        let window = MemoryWindow::new("top");
        let listener = window.listen();
        assert_eq!(window.listener_count(), 1);
        drop(listener);
        assert_eq!(window.listener_count(), 0);
    }

    #[test]
    fn closed_window_rejects_posts() {
        let window = MemoryWindow::new("frame");
        let port = window.port();
        window.close();

        assert!(window.is_closed());
        assert!(matches!(
            port.post_message("late"),
            Err(TransportError::Closed(name)) if name == "frame"
        ));
    }

    #[tokio::test]
    async fn lossy_port_drops_first_messages() {
        let window = MemoryWindow::new("frame");
        let mut listener = window.listen();
        let port = LossyPort::drop_first(window.port(), 2);

        for n in 1..=3 {
            port.post_message(&format!("m{n}")).unwrap();
        }

        assert_eq!(listener.recv().await.as_deref(), Some("m3"));
        assert_eq!(port.dropped(), 2);
        let nothing = tokio::time::timeout(Duration::from_millis(20), listener.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn lossy_port_drops_every_nth() {
        let window = MemoryWindow::new("frame");
        let mut listener = window.listen();
        let port = LossyPort::drop_every(window.port(), 2);

        for n in 1..=4 {
            port.post_message(&format!("m{n}")).unwrap();
        }

        assert_eq!(listener.recv().await.as_deref(), Some("m1"));
        assert_eq!(listener.recv().await.as_deref(), Some("m3"));
        assert_eq!(port.dropped(), 2);
    }

    #[tokio::test]
    async fn lagging_listener_skips_overwritten_messages() {
        let window = MemoryWindow::with_capacity("top", 2);
        let mut listener = window.listen();
        let port = window.port();
        for n in 1..=4 {
            port.post_message(&format!("m{n}")).unwrap();
        }

        assert_eq!(listener.recv().await.as_deref(), Some("m3"));
        assert_eq!(listener.recv().await.as_deref(), Some("m4"));
    }
}
