//! The embedder-only operations and their two implementations: direct
//! execution on the embedder, and RPC forwarding from the frame.

use std::sync::Arc;

use async_trait::async_trait;
use permtunnel_channel::Message;
use permtunnel_transport::PortHandle;
use serde_json::Value;

use crate::error::{PeerError, Result};
use crate::permission::run_request;
use crate::platform::{next_event, PermissionDecision, Platform};
use crate::registry::{PERMISSION_PROMPT_HIDDEN, PERMISSION_PROMPT_SHOWN};
use crate::rpc::RemoteCall;
use crate::timeout::{timeout, until_cancelled};
use crate::tunnel::{Arming, Shared};

/// Operations that only the embedder can perform.
///
/// The frame reaches them through RPC; the embedder runs them directly.
#[async_trait]
pub trait TunnelOps: Send + Sync {
    /// Prompt for permission to receive `event_type`, notifying observers.
    async fn request_permission(&self, event_type: &str) -> Result<PermissionDecision>;

    /// Whether events of `event_type` are currently receivable.
    async fn is_permission_granted(&self, event_type: &str) -> Result<bool>;

    /// Start relaying native `event_type` events to the remote party.
    async fn setup_event_forwarding(&self, event_type: &str) -> Result<()>;

    /// The application is showing its permission prompt.
    async fn notify_permission_prompt_shown(&self) -> Result<()>;

    /// The application hid its permission prompt.
    async fn notify_permission_prompt_hidden(&self) -> Result<()>;
}

/// Embedder-side implementation backed by the platform.
pub(crate) struct LocalOps {
    shared: Arc<Shared>,
    platform: Platform,
}

impl LocalOps {
    pub(crate) fn new(shared: Arc<Shared>, platform: Platform) -> Self {
        Self { shared, platform }
    }

    /// Deliver native `event_type` events to this side's own observers.
    pub(crate) fn arm_local_dispatch(&self, event_type: &str) {
        if !self.shared.arm(Arming::LocalDispatch, event_type) {
            return;
        }
        let serializers = self.platform.serializers().clone();
        self.spawn_sensor_loop(event_type, move |shared, event_type, event| {
            let args = [serializers.serialize(event_type, &event)];
            shared.registry.trigger(event_type, &args);
        });
    }

    fn spawn_sensor_loop<F>(&self, event_type: &str, mut on_event: F)
    where
        F: FnMut(&Shared, &str, Value) + Send + 'static,
    {
        let mut events = self.platform.sensors().subscribe(event_type);
        let shared = self.shared.clone();
        let event_type = event_type.to_string();

        tokio::spawn(async move {
            while let Some(event) = until_cancelled(&shared.shutdown, next_event(&mut events))
                .await
                .flatten()
            {
                on_event(&shared, &event_type, event);
            }
            tracing::debug!(%event_type, "sensor loop stopped");
        });
    }
}

#[async_trait]
impl TunnelOps for LocalOps {
    async fn request_permission(&self, event_type: &str) -> Result<PermissionDecision> {
        let granter = self.platform.granter_for(event_type);
        run_request(
            &self.shared.permissions,
            &self.shared.registry,
            event_type,
            || async move { Ok::<_, PeerError>(granter.request(event_type).await) },
        )
        .await
    }

    async fn is_permission_granted(&self, event_type: &str) -> Result<bool> {
        if !self.platform.granter_for(event_type).requires_prompt() {
            return Ok(true);
        }
        if let Some(decision) = self.shared.permissions.state(event_type).decision() {
            return Ok(decision.is_granted());
        }

        // Undecided: granted iff the platform is already delivering events.
        let mut events = self.platform.sensors().subscribe(event_type);
        let window = self.shared.config.permission_probe_window;
        match timeout(next_event(&mut events), window).await {
            Ok(fired) => Ok(fired.is_some()),
            Err(PeerError::Timeout(_)) => {
                tracing::debug!(event_type, ?window, "no sensor event within probe window");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn setup_event_forwarding(&self, event_type: &str) -> Result<()> {
        if !self.shared.arm(Arming::Forwarding, event_type) {
            tracing::trace!(event_type, "event forwarding already armed");
            return Ok(());
        }

        let serializers = self.platform.serializers().clone();
        self.spawn_sensor_loop(event_type, move |shared, event_type, event| {
            let Some(target) = shared.forward_target.get() else {
                tracing::trace!(event_type, "no forward target; event not forwarded");
                return;
            };
            let args = vec![serializers.serialize(event_type, &event)];
            let mut message = Message::event_callback(event_type, args);
            if let Err(err) = shared.channel.send(target.as_ref(), &mut message) {
                tracing::warn!(error = %err, event_type, "failed to forward event");
            }
        });
        tracing::debug!(event_type, "event forwarding armed");
        Ok(())
    }

    async fn notify_permission_prompt_shown(&self) -> Result<()> {
        self.shared.registry.trigger(PERMISSION_PROMPT_SHOWN, &[]);
        Ok(())
    }

    async fn notify_permission_prompt_hidden(&self) -> Result<()> {
        self.shared.registry.trigger(PERMISSION_PROMPT_HIDDEN, &[]);
        Ok(())
    }
}

/// Frame-side implementation: every operation becomes a `method-call` to the
/// embedder, issued once the handshake has completed.
pub(crate) struct RemoteOps {
    shared: Arc<Shared>,
    parent: PortHandle,
}

impl RemoteOps {
    pub(crate) fn new(shared: Arc<Shared>, parent: PortHandle) -> Self {
        Self { shared, parent }
    }

    async fn call(&self, call: RemoteCall) -> Result<Value> {
        self.shared.connection.wait().await;

        let method = call.method();
        let mut message = call.to_message();
        let reply = self
            .shared
            .channel
            .send_and_wait(self.parent.as_ref(), &mut message);
        let result = match self.shared.config.rpc_timeout {
            Some(limit) => timeout(reply, limit).await??,
            None => reply.await?,
        };

        tracing::debug!(method, id = message.id().unwrap_or_default(), "remote call returned");
        Ok(result)
    }
}

#[async_trait]
impl TunnelOps for RemoteOps {
    async fn request_permission(&self, event_type: &str) -> Result<PermissionDecision> {
        let result = self
            .call(RemoteCall::RequestPermission {
                event_type: event_type.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn is_permission_granted(&self, event_type: &str) -> Result<bool> {
        let result = self
            .call(RemoteCall::IsPermissionGranted {
                event_type: event_type.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn setup_event_forwarding(&self, event_type: &str) -> Result<()> {
        self.call(RemoteCall::SetupEventForwarding {
            event_type: event_type.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn notify_permission_prompt_shown(&self) -> Result<()> {
        self.call(RemoteCall::NotifyPromptShown).await?;
        Ok(())
    }

    async fn notify_permission_prompt_hidden(&self) -> Result<()> {
        self.call(RemoteCall::NotifyPromptHidden).await?;
        Ok(())
    }
}
