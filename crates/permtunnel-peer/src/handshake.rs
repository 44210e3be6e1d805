use std::sync::Arc;
use std::time::Duration;

use permtunnel_channel::{Message, MessageChannel, HANDSHAKE, HANDSHAKE_ACK};
use permtunnel_transport::PortHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::timeout::until_cancelled;

/// Whether the two parties have completed the handshake.
///
/// Flips from `false` to `true` at most once and never resets.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    established: Arc<watch::Sender<bool>>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        let (established, _) = watch::channel(false);
        Self {
            established: Arc::new(established),
        }
    }

    pub fn is_established(&self) -> bool {
        *self.established.borrow()
    }

    /// Mark the connection established. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_established(&self) -> bool {
        self.established.send_if_modified(|established| {
            if *established {
                false
            } else {
                *established = true;
                true
            }
        })
    }

    /// Watch for the transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.established.subscribe()
    }

    /// Resolve once the connection is established (immediately if it already is).
    pub async fn wait(&self) {
        let mut established = self.established.subscribe();
        loop {
            if *established.borrow_and_update() {
                return;
            }
            if established.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Frame side: answer every `handshake` with a `handshake-ack` to `parent`.
///
/// The first handshake establishes `connection`; later ones (retries from an
/// embedder that missed an ack) are re-acknowledged without another
/// transition.
pub fn spawn_handshake_responder(
    channel: MessageChannel,
    parent: PortHandle,
    connection: ConnectionState,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut handshakes = channel.inbox(HANDSHAKE);

    tokio::spawn(async move {
        while let Some(handshake) = until_cancelled(&shutdown, handshakes.recv()).await.flatten() {
            if connection.mark_established() {
                tracing::info!(
                    id = handshake.id().unwrap_or_default(),
                    "handshake received; connection established"
                );
            }

            if let Err(err) = channel.send(parent.as_ref(), &mut Message::handshake_ack()) {
                tracing::warn!(error = %err, "failed to send handshake-ack");
            }
        }
        tracing::debug!("handshake responder stopped");
    })
}

/// Embedder side: send `handshake` to `target` every `interval` until a
/// `handshake-ack` arrives, then mark `connection` established and stop.
///
/// Tolerates a frame that attaches its listener late, at the cost of
/// duplicate handshakes. Resolves to the number of attempts sent, or `None`
/// if cancelled first.
pub fn spawn_handshake_initiator(
    channel: MessageChannel,
    target: PortHandle,
    connection: ConnectionState,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<Option<u32>> {
    let mut acks = channel.inbox(HANDSHAKE_ACK);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::debug!(attempts, "handshake cancelled");
                    return None;
                }
                ack = acks.recv() => {
                    if ack.is_none() {
                        tracing::warn!(attempts, "message source closed during handshake");
                        return None;
                    }
                    connection.mark_established();
                    tracing::info!(attempts, "handshake acknowledged");
                    return Some(attempts);
                }
                _ = ticker.tick() => {
                    attempts += 1;
                    match channel.send(target.as_ref(), &mut Message::handshake()) {
                        Ok(()) => tracing::trace!(attempts, "handshake sent"),
                        Err(err) => {
                            tracing::warn!(error = %err, attempts, "failed to send handshake")
                        }
                    }
                }
            }
        }
    })
}
