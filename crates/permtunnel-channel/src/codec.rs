use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, Result};
use crate::kind::{
    event_type_of_callback, HANDSHAKE, HANDSHAKE_ACK, METHOD_CALL, METHOD_CALL_RESPONSE,
};
use crate::message::{Message, Payload};

/// Flat JSON shape shared by every message kind.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "_iframe_permissions_tunnel", default)]
    marker: bool,
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Value>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    result: Option<Value>,
}

// Distinguishes `"result": null` (present) from a missing field.
fn present<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Encode a message as JSON text, marker included.
///
/// Wire format:
/// ```text
/// {"_iframe_permissions_tunnel":true,"type":"method-call","id":"0a1f-...","method":"requestPermissionFor","args":["deviceorientation"]}
/// ```
pub fn encode(message: &Message) -> Result<String> {
    let mut wire = WireMessage {
        marker: true,
        msg_type: message.msg_type().into_owned(),
        id: message.id.clone(),
        method: None,
        args: None,
        result: None,
    };

    match &message.payload {
        Payload::Handshake | Payload::HandshakeAck => {}
        Payload::MethodCall { method, args } => {
            wire.method = Some(method.clone());
            wire.args = Some(args.clone());
        }
        Payload::MethodCallResponse { result } => {
            wire.result = Some(result.clone());
        }
        Payload::EventCallback { args, .. } => {
            wire.args = Some(args.clone());
        }
    }

    Ok(serde_json::to_string(&wire)?)
}

/// Decode JSON text into a message.
///
/// Fails for malformed JSON, for objects without the tunnel marker, for
/// unknown types and for kinds missing a required field.
pub fn decode(text: &str) -> Result<Message> {
    let wire: WireMessage = serde_json::from_str(text)?;
    if !wire.marker {
        return Err(ChannelError::NotTunnelTraffic);
    }

    let payload = match wire.msg_type.as_str() {
        HANDSHAKE => Payload::Handshake,
        HANDSHAKE_ACK => Payload::HandshakeAck,
        METHOD_CALL => Payload::MethodCall {
            method: wire.method.ok_or_else(|| ChannelError::MissingField {
                msg_type: wire.msg_type.clone(),
                field: "method",
            })?,
            args: wire.args.unwrap_or_default(),
        },
        METHOD_CALL_RESPONSE => Payload::MethodCallResponse {
            result: wire.result.ok_or_else(|| ChannelError::MissingField {
                msg_type: wire.msg_type.clone(),
                field: "result",
            })?,
        },
        other => match event_type_of_callback(other) {
            Some(event_type) => Payload::EventCallback {
                event_type: event_type.to_string(),
                args: wire.args.unwrap_or_default(),
            },
            None => return Err(ChannelError::UnknownType(other.to_string())),
        },
    };

    Ok(Message {
        id: wire.id,
        payload,
    })
}
