use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use permtunnel_channel::{callback_type, Message, MessageChannel, Payload};
use permtunnel_transport::{MessageSource, PortHandle};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::TunnelConfig;
use crate::error::{PeerError, Result};
use crate::handshake::{spawn_handshake_initiator, spawn_handshake_responder, ConnectionState};
use crate::ops::{LocalOps, RemoteOps, TunnelOps};
use crate::permission::{run_request, PermissionState, PermissionTracker};
use crate::platform::Platform;
use crate::registry::{
    Callback, CallbackRegistry, PERMISSION_DENIED, PERMISSION_GRANTED, PERMISSION_PROMPT_HIDDEN,
    PERMISSION_PROMPT_SHOWN, PERMISSION_REQUESTED,
};
use crate::rpc::spawn_dispatcher;

/// Which side of the boundary a tunnel lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The embedded party. Embedder-only operations are forwarded over RPC.
    Frame,
    /// The hosting party. Owns the platform capabilities.
    Embedder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Frame => f.write_str("frame"),
            Role::Embedder => f.write_str("embedder"),
        }
    }
}

/// Background work armed at most once per event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Arming {
    /// Native events relayed to the forward target.
    Forwarding,
    /// Native events delivered to this side's own observers.
    LocalDispatch,
    /// `{eventType}-callback` messages delivered to the frame's observers.
    Relay,
}

/// State owned by one tunnel and shared with its background tasks.
pub(crate) struct Shared {
    pub(crate) config: TunnelConfig,
    pub(crate) channel: MessageChannel,
    pub(crate) connection: ConnectionState,
    pub(crate) forward_target: OnceLock<PortHandle>,
    pub(crate) registry: CallbackRegistry,
    pub(crate) permissions: PermissionTracker,
    pub(crate) shutdown: CancellationToken,
    armed: Mutex<HashSet<(Arming, String)>>,
}

impl Shared {
    fn new(source: Arc<dyn MessageSource>, config: TunnelConfig) -> Self {
        Self {
            config,
            channel: MessageChannel::new(source),
            connection: ConnectionState::new(),
            forward_target: OnceLock::new(),
            registry: CallbackRegistry::new(),
            permissions: PermissionTracker::new(),
            shutdown: CancellationToken::new(),
            armed: Mutex::new(HashSet::new()),
        }
    }

    /// Claim `kind` for `event_type`. Returns `false` if already armed.
    pub(crate) fn arm(&self, kind: Arming, event_type: &str) -> bool {
        self.armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, event_type.to_string()))
    }
}

enum Side {
    Frame { ops: Arc<RemoteOps> },
    Embedder { ops: Arc<LocalOps> },
}

/// One party of the permissions tunnel.
///
/// Both sides expose the same API. On the embedder, permission and event
/// operations run against the [`Platform`]; on the frame, the embedder-only
/// ones are forwarded over RPC once the handshake has completed.
///
/// Background tasks are spawned onto the current Tokio runtime and stop when
/// the tunnel is dropped or [`Tunnel::shutdown`] is called.
pub struct Tunnel {
    shared: Arc<Shared>,
    side: Side,
}

impl Tunnel {
    /// Embedder-side tunnel listening on `source`.
    ///
    /// Nothing crosses the boundary until [`Tunnel::forward_to`] is called.
    pub fn embedder(source: Arc<dyn MessageSource>, platform: Platform) -> Self {
        Self::embedder_with_config(source, platform, TunnelConfig::default())
    }

    pub fn embedder_with_config(
        source: Arc<dyn MessageSource>,
        platform: Platform,
        config: TunnelConfig,
    ) -> Self {
        let shared = Arc::new(Shared::new(source, config));
        let ops = Arc::new(LocalOps::new(shared.clone(), platform));
        tracing::debug!("embedder tunnel created");
        Self {
            shared,
            side: Side::Embedder { ops },
        }
    }

    /// Frame-side tunnel listening on `source` and talking to `parent`.
    ///
    /// Starts answering handshakes immediately. Must be called within a
    /// Tokio runtime.
    pub fn frame(source: Arc<dyn MessageSource>, parent: PortHandle) -> Self {
        Self::frame_with_config(source, parent, TunnelConfig::default())
    }

    pub fn frame_with_config(
        source: Arc<dyn MessageSource>,
        parent: PortHandle,
        config: TunnelConfig,
    ) -> Self {
        let shared = Arc::new(Shared::new(source, config));

        spawn_handshake_responder(
            shared.channel.clone(),
            parent.clone(),
            shared.connection.clone(),
            shared.shutdown.clone(),
        );
        let ops = Arc::new(RemoteOps::new(shared.clone(), parent));
        tracing::debug!("frame tunnel created; waiting for handshake");
        Self {
            shared,
            side: Side::Frame { ops },
        }
    }

    /// Start talking to the frame behind `target`: answer its forwarded
    /// method calls and handshake with it until acknowledged.
    ///
    /// Embedder only, and only once per tunnel. Must be called within a
    /// Tokio runtime.
    pub fn forward_to(&self, target: PortHandle) -> Result<()> {
        let Side::Embedder { ops } = &self.side else {
            return Err(PeerError::WrongRole {
                operation: "forward_to",
                role: self.role(),
            });
        };
        if self.shared.forward_target.set(target.clone()).is_err() {
            return Err(PeerError::AlreadyForwarding);
        }

        let dispatch_ops: Arc<dyn TunnelOps> = ops.clone();
        spawn_dispatcher(
            self.shared.channel.clone(),
            dispatch_ops,
            target.clone(),
            self.shared.shutdown.clone(),
        );
        spawn_handshake_initiator(
            self.shared.channel.clone(),
            target,
            self.shared.connection.clone(),
            self.shared.config.handshake_interval,
            self.shared.shutdown.clone(),
        );
        tracing::info!(
            interval = ?self.shared.config.handshake_interval,
            "forwarding to frame; handshake started"
        );
        Ok(())
    }

    pub fn role(&self) -> Role {
        match self.side {
            Side::Frame { .. } => Role::Frame,
            Side::Embedder { .. } => Role::Embedder,
        }
    }

    pub fn is_in_frame(&self) -> bool {
        self.role() == Role::Frame
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.shared.config
    }

    /// Whether the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.shared.connection.is_established()
    }

    /// Resolve once the handshake has completed.
    pub async fn wait_for_handshake(&self) {
        self.shared.connection.wait().await;
    }

    /// This side's view of the permission for `event_type`.
    pub fn permission_state(&self, event_type: &str) -> PermissionState {
        self.shared.permissions.state(event_type)
    }

    /// Ask for permission to receive `event_type`. Returns whether it was
    /// granted.
    ///
    /// Fires `permission:requested` and then `permission:granted` or
    /// `permission:denied` on this side. A decision already made is returned
    /// without prompting again.
    pub async fn request_permission_for(&self, event_type: &str) -> Result<bool> {
        let decision = match &self.side {
            Side::Embedder { ops } => ops.request_permission(event_type).await?,
            Side::Frame { ops } => {
                run_request(
                    &self.shared.permissions,
                    &self.shared.registry,
                    event_type,
                    || ops.request_permission(event_type),
                )
                .await?
            }
        };
        Ok(decision.is_granted())
    }

    /// Whether events of `event_type` can be received right now, without
    /// prompting.
    pub async fn is_permission_granted(&self, event_type: &str) -> Result<bool> {
        match &self.side {
            Side::Embedder { ops } => ops.is_permission_granted(event_type).await,
            Side::Frame { ops } => match self.shared.permissions.state(event_type).decision() {
                Some(decision) => Ok(decision.is_granted()),
                None => ops.is_permission_granted(event_type).await,
            },
        }
    }

    /// Register `callback` for `event_type` events, provided permission is
    /// already granted. Returns whether the callback was registered.
    ///
    /// Without permission nothing is registered and nothing is armed. With
    /// it, native events captured on the embedder reach `callback` on
    /// either side with the serialized event as the only argument. If
    /// forwarding cannot be set up, `callback` is removed again and the
    /// error is returned.
    pub async fn add_event_listener<F>(&self, event_type: &str, callback: F) -> Result<bool>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        if !self.is_permission_granted(event_type).await? {
            tracing::warn!(event_type, "permission not granted; listener not registered");
            return Ok(false);
        }

        let callback: Callback = Arc::new(callback);
        self.shared.registry.register(event_type, callback.clone());
        let forwarding = match &self.side {
            Side::Frame { ops } => {
                self.arm_relay(event_type);
                ops.setup_event_forwarding(event_type).await
            }
            Side::Embedder { ops } => {
                ops.arm_local_dispatch(event_type);
                ops.setup_event_forwarding(event_type).await
            }
        };
        if let Err(err) = forwarding {
            self.shared.registry.unregister(event_type, &callback);
            tracing::warn!(error = %err, event_type, "event forwarding failed; listener removed");
            return Err(err);
        }
        tracing::debug!(event_type, role = %self.role(), "event listener added");
        Ok(true)
    }

    fn arm_relay(&self, event_type: &str) {
        if !self.shared.arm(Arming::Relay, event_type) {
            return;
        }
        let shared = self.shared.clone();
        let relayed = event_type.to_string();
        self.shared
            .channel
            .subscribe(callback_type(event_type), move |message: Message| {
                if let Payload::EventCallback { args, .. } = message.payload {
                    shared.registry.trigger(&relayed, &args);
                }
            });
    }

    /// Tell the embedder the application is showing its permission prompt.
    pub async fn notify_permission_prompt_shown(&self) -> Result<()> {
        self.ops().notify_permission_prompt_shown().await
    }

    /// Tell the embedder the application hid its permission prompt.
    pub async fn notify_permission_prompt_hidden(&self) -> Result<()> {
        self.ops().notify_permission_prompt_hidden().await
    }

    fn ops(&self) -> &dyn TunnelOps {
        match &self.side {
            Side::Frame { ops } => ops.as_ref(),
            Side::Embedder { ops } => ops.as_ref(),
        }
    }

    pub fn on_permission_requested<F>(&self, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register_callback(PERMISSION_REQUESTED, Arc::new(callback));
    }

    pub fn on_permission_granted<F>(&self, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register_callback(PERMISSION_GRANTED, Arc::new(callback));
    }

    pub fn on_permission_denied<F>(&self, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register_callback(PERMISSION_DENIED, Arc::new(callback));
    }

    pub fn on_permission_prompt_shown<F>(&self, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register_callback(PERMISSION_PROMPT_SHOWN, Arc::new(callback));
    }

    pub fn on_permission_prompt_hidden<F>(&self, callback: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.register_callback(PERMISSION_PROMPT_HIDDEN, Arc::new(callback));
    }

    pub fn register_callback(&self, name: &str, callback: Callback) {
        self.shared.registry.register(name, callback);
    }

    /// Invoke the observers of `name` on this side. Returns how many ran.
    pub fn trigger_callbacks(&self, name: &str, args: &[Value]) -> usize {
        self.shared.registry.trigger(name, args)
    }

    pub fn callback_count(&self, name: &str) -> usize {
        self.shared.registry.count(name)
    }

    /// Stop every background task and fail pending forwarded calls.
    pub fn shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            tracing::debug!(role = %self.role(), "tunnel shutting down");
        }
        self.shared.shutdown.cancel();
        self.shared.channel.close();
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("role", &self.role())
            .field("connected", &self.is_connected())
            .field("forwarding", &self.shared.forward_target.get().is_some())
            .finish()
    }
}
