use std::sync::Arc;

use permtunnel_transport::{Listener, MessagePort, MessageSource};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::codec::{decode, encode};
use crate::error::{ChannelError, Result};
use crate::message::{Message, Payload, TypeFilter};

/// Type-filtered subscriptions and reply correlation over a message source.
///
/// Subscriptions run as Tokio tasks, so they must be created from within a
/// runtime. [`MessageChannel::close`] stops every subscription and fails
/// every pending [`MessageChannel::send_and_wait`].
#[derive(Clone)]
pub struct MessageChannel {
    source: Arc<dyn MessageSource>,
    closed: CancellationToken,
}

impl MessageChannel {
    /// Build a channel listening on `source`.
    pub fn new(source: Arc<dyn MessageSource>) -> Self {
        Self {
            source,
            closed: CancellationToken::new(),
        }
    }

    /// Attach a filtered inbox. Messages posted from now on are observed.
    pub fn inbox(&self, filter: impl Into<TypeFilter>) -> Inbox {
        Inbox {
            listener: self.source.listen(),
            filter: filter.into(),
        }
    }

    /// Invoke `handler` for every matching inbound message until the returned
    /// subscription is cancelled.
    ///
    /// Dropping the [`Subscription`] does not stop delivery.
    pub fn subscribe<F>(&self, filter: impl Into<TypeFilter>, mut handler: F) -> Subscription
    where
        F: FnMut(Message) + Send + 'static,
    {
        let mut inbox = self.inbox(filter);
        let token = self.closed.child_token();
        let task_token = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    message = inbox.recv() => match message {
                        Some(message) => handler(message),
                        None => break,
                    },
                }
            }
        });

        Subscription { token }
    }

    /// Like [`MessageChannel::subscribe`], but unsubscribes itself after the
    /// first delivery.
    pub fn subscribe_once<F>(&self, filter: impl Into<TypeFilter>, handler: F) -> Subscription
    where
        F: FnOnce(Message) + Send + 'static,
    {
        let mut inbox = self.inbox(filter);
        let token = self.closed.child_token();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                message = inbox.recv() => {
                    task_token.cancel();
                    if let Some(message) = message {
                        handler(message);
                    }
                }
            }
        });

        Subscription { token }
    }

    /// Post `message` to `target` without waiting for anything.
    ///
    /// Attaches a fresh id when the message has none.
    pub fn send(&self, target: &dyn MessagePort, message: &mut Message) -> Result<()> {
        message.ensure_id();
        let text = encode(message)?;
        target.post_message(&text)?;
        tracing::trace!(
            msg_type = %message.msg_type(),
            id = message.id().unwrap_or_default(),
            "message sent"
        );
        Ok(())
    }

    /// Post `message` and wait for the `method-call-response` echoing its id.
    ///
    /// There is no deadline here; a peer that never replies keeps this
    /// pending until the channel is closed. Later replies with the same id
    /// are ignored.
    pub async fn send_and_wait(
        &self,
        target: &dyn MessagePort,
        message: &mut Message,
    ) -> Result<Value> {
        let id = message.ensure_id().to_string();
        // Attach before posting so a fast reply cannot slip past.
        let mut replies = self.inbox(TypeFilter::Any);
        self.send(target, message)?;

        loop {
            let reply = tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(ChannelError::Closed),
                reply = replies.recv() => reply.ok_or(ChannelError::Closed)?,
            };

            if reply.id() != Some(id.as_str()) {
                continue;
            }
            if let Payload::MethodCallResponse { result } = reply.payload {
                return Ok(result);
            }
        }
    }

    /// Stop all subscriptions and fail pending waits.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// A filtered view of inbound messages.
///
/// Inbound text that does not decode as tunnel traffic is skipped.
pub struct Inbox {
    listener: Listener,
    filter: TypeFilter,
}

impl Inbox {
    /// Wait for the next matching message. `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            let text = self.listener.recv().await?;
            match decode(&text) {
                Ok(message) if self.filter.matches(&message) => return Some(message),
                Ok(_) => {}
                Err(err) => {
                    tracing::trace!(error = %err, "ignoring inbound message");
                }
            }
        }
    }
}

/// Handle to a running subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    /// Stop receiving callbacks.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use permtunnel_transport::MemoryWindow;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn channel_on(window: &MemoryWindow) -> MessageChannel {
        MessageChannel::new(Arc::new(window.clone()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn exact_subscriber_gets_one_delivery_per_send() {
        let window = MemoryWindow::new("frame");
        let channel = channel_on(&window);
        let exact = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));

        let counter = exact.clone();
        channel.subscribe("handshake", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = other.clone();
        channel.subscribe("handshake-ack", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let port = window.port();
        for _ in 0..3 {
            channel.send(port.as_ref(), &mut Message::handshake()).unwrap();
        }
        settle().await;

        assert_eq!(exact.load(Ordering::SeqCst), 3);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wildcard_subscriber_sees_all_tunnel_traffic() {
        let window = MemoryWindow::new("frame");
        let channel = channel_on(&window);
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.subscribe("*", move |message: Message| {
            let _ = tx.send(message.msg_type().into_owned());
        });

        let port = window.port();
        port.post_message("not json at all").unwrap();
        port.post_message(r#"{"type":"handshake"}"#).unwrap();
        channel.send(port.as_ref(), &mut Message::handshake()).unwrap();
        channel
            .send(port.as_ref(), &mut Message::event_callback("devicemotion", vec![]))
            .unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("handshake"));
        assert_eq!(rx.recv().await.as_deref(), Some("devicemotion-callback"));
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let window = MemoryWindow::new("frame");
        let channel = channel_on(&window);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = channel.subscribe("handshake", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let port = window.port();
        channel.send(port.as_ref(), &mut Message::handshake()).unwrap();
        settle().await;
        subscription.unsubscribe();
        settle().await;
        channel.send(port.as_ref(), &mut Message::handshake()).unwrap();
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn subscribe_once_fires_a_single_time() {
        let window = MemoryWindow::new("top");
        let channel = channel_on(&window);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let subscription = channel.subscribe_once("handshake-ack", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let port = window.port();
        for _ in 0..3 {
            channel.send(port.as_ref(), &mut Message::handshake_ack()).unwrap();
        }
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn send_attaches_id_to_caller_message() {
        let window = MemoryWindow::new("frame");
        let channel = channel_on(&window);
        let mut inbox = channel.inbox("*");

        let mut message = Message::handshake();
        channel.send(window.port().as_ref(), &mut message).unwrap();
        let received = inbox.recv().await.unwrap();

        assert!(message.id().is_some());
        assert_eq!(received.id(), message.id());
    }

    #[tokio::test]
    async fn send_and_wait_resolves_with_first_matching_reply() {
        let top = MemoryWindow::new("top");
        let frame = MemoryWindow::new("frame");
        let frame_channel = channel_on(&frame);
        let top_channel = channel_on(&top);

        // Embedder stand-in: answers each call twice with distinct results.
        let mut calls = top_channel.inbox("method-call");
        let responder = top_channel.clone();
        let frame_port = frame.port();
        tokio::spawn(async move {
            while let Some(call) = calls.recv().await {
                let id = call.id().unwrap_or_default().to_string();
                let Payload::MethodCall { args, .. } = call.payload else {
                    continue;
                };
                let mut first = Message::method_call_response(id.clone(), json!({ "echo": args }));
                let mut second = Message::method_call_response(id, json!("late duplicate"));
                responder.send(frame_port.as_ref(), &mut first).unwrap();
                responder.send(frame_port.as_ref(), &mut second).unwrap();
            }
        });

        let mut call = Message::method_call("echo", vec![json!(3), json!("x")]);
        let result = frame_channel
            .send_and_wait(top.port().as_ref(), &mut call)
            .await
            .unwrap();

        assert_eq!(result, json!({ "echo": [3, "x"] }));
    }

    #[tokio::test]
    async fn send_and_wait_ignores_replies_for_other_ids() {
        let top = MemoryWindow::new("top");
        let frame = MemoryWindow::new("frame");
        let channel = channel_on(&frame);
        let frame_port = frame.port();

        let mut call = Message::with_id(
            "wanted",
            Payload::MethodCall {
                method: "isPermissionGranted".to_string(),
                args: vec![],
            },
        );
        let waiter = {
            let channel = channel.clone();
            let top_port = top.port();
            tokio::spawn(async move { channel.send_and_wait(top_port.as_ref(), &mut call).await })
        };
        settle().await;

        let poster = channel_on(&top);
        poster
            .send(frame_port.as_ref(), &mut Message::method_call_response("other", json!(false)))
            .unwrap();
        poster
            .send(frame_port.as_ref(), &mut Message::with_id("wanted", Payload::HandshakeAck))
            .unwrap();
        poster
            .send(frame_port.as_ref(), &mut Message::method_call_response("wanted", json!(true)))
            .unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), json!(true));
    }

    #[tokio::test]
    async fn close_fails_pending_wait() {
        let top = MemoryWindow::new("top");
        let frame = MemoryWindow::new("frame");
        let channel = channel_on(&frame);

        let waiter = {
            let channel = channel.clone();
            let top_port = top.port();
            tokio::spawn(async move {
                channel
                    .send_and_wait(top_port.as_ref(), &mut Message::method_call("never", vec![]))
                    .await
            })
        };
        settle().await;
        channel.close();

        assert!(matches!(waiter.await.unwrap(), Err(ChannelError::Closed)));
        assert!(channel.is_closed());
    }
}
