//! Forwarded method calls: the closed set of embedder-only methods, their
//! wire encoding, and the embedder's dispatcher.

use std::sync::Arc;

use permtunnel_channel::{Message, MessageChannel, Payload, METHOD_CALL};
use permtunnel_transport::{MessagePort, PortHandle};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PeerError, Result};
use crate::ops::TunnelOps;
use crate::timeout::until_cancelled;

pub const REQUEST_PERMISSION: &str = "requestPermissionFor";
pub const IS_PERMISSION_GRANTED: &str = "isPermissionGranted";
pub const SETUP_EVENT_FORWARDING: &str = "setupEventForwarding";
pub const NOTIFY_PROMPT_SHOWN: &str = "notifyPermissionPromptIsShown";
pub const NOTIFY_PROMPT_HIDDEN: &str = "notifyPermissionPromptIsHidden";

/// A method the frame asks the embedder to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    RequestPermission { event_type: String },
    IsPermissionGranted { event_type: String },
    SetupEventForwarding { event_type: String },
    NotifyPromptShown,
    NotifyPromptHidden,
}

impl RemoteCall {
    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            RemoteCall::RequestPermission { .. } => REQUEST_PERMISSION,
            RemoteCall::IsPermissionGranted { .. } => IS_PERMISSION_GRANTED,
            RemoteCall::SetupEventForwarding { .. } => SETUP_EVENT_FORWARDING,
            RemoteCall::NotifyPromptShown => NOTIFY_PROMPT_SHOWN,
            RemoteCall::NotifyPromptHidden => NOTIFY_PROMPT_HIDDEN,
        }
    }

    /// Ordered wire argument list.
    pub fn args(&self) -> Vec<Value> {
        match self {
            RemoteCall::RequestPermission { event_type }
            | RemoteCall::IsPermissionGranted { event_type }
            | RemoteCall::SetupEventForwarding { event_type } => {
                vec![Value::String(event_type.clone())]
            }
            RemoteCall::NotifyPromptShown | RemoteCall::NotifyPromptHidden => Vec::new(),
        }
    }

    /// Parse a wire method name and argument list.
    pub fn from_wire(method: &str, args: &[Value]) -> Result<Self> {
        match method {
            REQUEST_PERMISSION => Ok(RemoteCall::RequestPermission {
                event_type: event_type_arg(method, args)?,
            }),
            IS_PERMISSION_GRANTED => Ok(RemoteCall::IsPermissionGranted {
                event_type: event_type_arg(method, args)?,
            }),
            SETUP_EVENT_FORWARDING => Ok(RemoteCall::SetupEventForwarding {
                event_type: event_type_arg(method, args)?,
            }),
            NOTIFY_PROMPT_SHOWN => no_args(method, args).map(|()| RemoteCall::NotifyPromptShown),
            NOTIFY_PROMPT_HIDDEN => no_args(method, args).map(|()| RemoteCall::NotifyPromptHidden),
            other => Err(PeerError::UnknownMethod(other.to_string())),
        }
    }

    /// Build the `method-call` message for this call.
    pub fn to_message(&self) -> Message {
        Message::method_call(self.method(), self.args())
    }
}

fn event_type_arg(method: &str, args: &[Value]) -> Result<String> {
    match args {
        [Value::String(event_type)] if !event_type.is_empty() => Ok(event_type.clone()),
        _ => Err(PeerError::InvalidArguments {
            method: method.to_string(),
            reason: format!("expected one event type string, got {}", Value::from(args.to_vec())),
        }),
    }
}

fn no_args(method: &str, args: &[Value]) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(PeerError::InvalidArguments {
            method: method.to_string(),
            reason: format!("expected no arguments, got {}", args.len()),
        })
    }
}

/// Run `call` against `ops` and encode its result for the wire.
pub async fn invoke(ops: &dyn TunnelOps, call: &RemoteCall) -> Result<Value> {
    let result = match call {
        RemoteCall::RequestPermission { event_type } => {
            serde_json::to_value(ops.request_permission(event_type).await?)?
        }
        RemoteCall::IsPermissionGranted { event_type } => {
            Value::Bool(ops.is_permission_granted(event_type).await?)
        }
        RemoteCall::SetupEventForwarding { event_type } => {
            ops.setup_event_forwarding(event_type).await?;
            Value::Null
        }
        RemoteCall::NotifyPromptShown => {
            ops.notify_permission_prompt_shown().await?;
            Value::Null
        }
        RemoteCall::NotifyPromptHidden => {
            ops.notify_permission_prompt_hidden().await?;
            Value::Null
        }
    };
    Ok(result)
}

/// Embedder side: run every inbound `method-call` against `ops` and send the
/// `method-call-response` to `reply_to`.
///
/// Calls run concurrently. A call that names an unknown method, carries bad
/// arguments or fails while running gets no reply; the protocol has no error
/// response.
pub fn spawn_dispatcher(
    channel: MessageChannel,
    ops: Arc<dyn TunnelOps>,
    reply_to: PortHandle,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let mut calls = channel.inbox(METHOD_CALL);

    tokio::spawn(async move {
        while let Some(message) = until_cancelled(&shutdown, calls.recv()).await.flatten() {
            let channel = channel.clone();
            let ops = ops.clone();
            let reply_to = reply_to.clone();
            tokio::spawn(async move {
                dispatch(&channel, ops.as_ref(), reply_to.as_ref(), message).await;
            });
        }
        tracing::debug!("method dispatcher stopped");
    })
}

async fn dispatch(
    channel: &MessageChannel,
    ops: &dyn TunnelOps,
    reply_to: &dyn MessagePort,
    message: Message,
) {
    let Some(id) = message.id.clone() else {
        tracing::warn!("dropping method-call without id");
        return;
    };
    let Payload::MethodCall { method, args } = message.payload else {
        return;
    };

    let call = match RemoteCall::from_wire(&method, &args) {
        Ok(call) => call,
        Err(err) => {
            tracing::warn!(error = %err, %method, %id, "rejecting method call");
            return;
        }
    };

    tracing::debug!(%method, %id, "dispatching method call");
    let result = match invoke(ops, &call).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, %method, %id, "method call failed");
            return;
        }
    };

    let mut response = Message::method_call_response(id, result);
    if let Err(err) = channel.send(reply_to, &mut response) {
        tracing::warn!(error = %err, %method, "failed to send method-call-response");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use permtunnel_transport::MemoryWindow;
    use serde_json::json;

    use super::*;
    use crate::platform::PermissionDecision;

    #[derive(Default)]
    struct RecordingOps {
        calls: Mutex<Vec<RemoteCall>>,
    }

    impl RecordingOps {
        fn record(&self, call: RemoteCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl TunnelOps for RecordingOps {
        async fn request_permission(&self, event_type: &str) -> Result<PermissionDecision> {
            self.record(RemoteCall::RequestPermission {
                event_type: event_type.to_string(),
            });
            Ok(PermissionDecision::Granted)
        }

        async fn is_permission_granted(&self, event_type: &str) -> Result<bool> {
            self.record(RemoteCall::IsPermissionGranted {
                event_type: event_type.to_string(),
            });
            Ok(false)
        }

        async fn setup_event_forwarding(&self, event_type: &str) -> Result<()> {
            self.record(RemoteCall::SetupEventForwarding {
                event_type: event_type.to_string(),
            });
            Ok(())
        }

        async fn notify_permission_prompt_shown(&self) -> Result<()> {
            self.record(RemoteCall::NotifyPromptShown);
            Ok(())
        }

        async fn notify_permission_prompt_hidden(&self) -> Result<()> {
            self.record(RemoteCall::NotifyPromptHidden);
            Ok(())
        }
    }

    struct Harness {
        frame_channel: MessageChannel,
        top: MemoryWindow,
        ops: Arc<RecordingOps>,
        shutdown: CancellationToken,
    }

    fn harness() -> Harness {
        let top = MemoryWindow::new("top");
        let frame = MemoryWindow::new("frame");
        let ops = Arc::new(RecordingOps::default());
        let shutdown = CancellationToken::new();
        spawn_dispatcher(
            MessageChannel::new(Arc::new(top.clone())),
            ops.clone(),
            frame.port(),
            shutdown.clone(),
        );
        Harness {
            frame_channel: MessageChannel::new(Arc::new(frame)),
            top,
            ops,
            shutdown,
        }
    }

    #[test]
    fn wire_names_roundtrip() {
        let calls = [
            RemoteCall::RequestPermission {
                event_type: "deviceorientation".to_string(),
            },
            RemoteCall::IsPermissionGranted {
                event_type: "devicemotion".to_string(),
            },
            RemoteCall::SetupEventForwarding {
                event_type: "deviceorientation".to_string(),
            },
            RemoteCall::NotifyPromptShown,
            RemoteCall::NotifyPromptHidden,
        ];
        for call in calls {
            let parsed = RemoteCall::from_wire(call.method(), &call.args()).unwrap();
            assert_eq!(parsed, call);
        }
    }

    #[test]
    fn rejects_unknown_methods_and_bad_arguments() {
        assert!(matches!(
            RemoteCall::from_wire("constructor", &[]),
            Err(PeerError::UnknownMethod(name)) if name == "constructor"
        ));
        assert!(matches!(
            RemoteCall::from_wire(REQUEST_PERMISSION, &[json!(3), json!("x")]),
            Err(PeerError::InvalidArguments { .. })
        ));
        assert!(matches!(
            RemoteCall::from_wire(IS_PERMISSION_GRANTED, &[json!("")]),
            Err(PeerError::InvalidArguments { .. })
        ));
        assert!(matches!(
            RemoteCall::from_wire(NOTIFY_PROMPT_SHOWN, &[json!(true)]),
            Err(PeerError::InvalidArguments { .. })
        ));
    }

    #[tokio::test]
    async fn call_is_dispatched_with_its_arguments_and_answered() {
        let h = harness();
        let call = RemoteCall::RequestPermission {
            event_type: "deviceorientation".to_string(),
        };

        let result = h
            .frame_channel
            .send_and_wait(h.top.port().as_ref(), &mut call.to_message())
            .await
            .unwrap();

        assert_eq!(result, json!("granted"));
        assert_eq!(*h.ops.calls.lock().unwrap(), vec![call]);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn unit_results_are_sent_as_null() {
        let h = harness();
        let result = h
            .frame_channel
            .send_and_wait(
                h.top.port().as_ref(),
                &mut RemoteCall::NotifyPromptHidden.to_message(),
            )
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn unknown_method_gets_no_reply() {
        let h = harness();
        let mut call = Message::method_call("dropDatabase", vec![json!(3), json!("x")]);

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            h.frame_channel.send_and_wait(h.top.port().as_ref(), &mut call),
        )
        .await;

        assert!(waited.is_err());
        assert!(h.ops.calls.lock().unwrap().is_empty());
        h.shutdown.cancel();
    }
}
