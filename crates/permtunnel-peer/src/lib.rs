//! The two parties of the permissions tunnel.
//!
//! An embedder hosts a frame. Only the embedder can prompt for sensor
//! permissions and capture native sensor events; the frame reaches those
//! capabilities by forwarding method calls over a [`MessageChannel`] once a
//! handshake has completed. Captured events flow back as
//! `{eventType}-callback` messages.
//!
//! [`MessageChannel`]: permtunnel_channel::MessageChannel

pub mod config;
pub mod error;
pub mod events;
pub mod handshake;
pub mod ops;
pub mod permission;
pub mod platform;
pub mod registry;
pub mod rpc;
pub mod timeout;
pub mod tunnel;

pub use config::{TunnelConfig, DEFAULT_HANDSHAKE_INTERVAL, DEFAULT_PERMISSION_PROBE_WINDOW};
pub use error::{PeerError, Result};
pub use events::{
    pick_fields, serialize_motion, serialize_orientation, EventSerializer, EventSerializers,
    DEVICE_MOTION, DEVICE_ORIENTATION,
};
pub use handshake::{spawn_handshake_initiator, spawn_handshake_responder, ConnectionState};
pub use ops::TunnelOps;
pub use permission::{PermissionState, PermissionTracker, RequestTicket};
pub use platform::{
    FixedGranter, NullPermissionGranter, PermissionDecision, PermissionGranter, Platform,
    SensorSource, SimulatedSensors,
};
pub use registry::{
    Callback, CallbackRegistry, PERMISSION_DENIED, PERMISSION_GRANTED, PERMISSION_PROMPT_HIDDEN,
    PERMISSION_PROMPT_SHOWN, PERMISSION_REQUESTED,
};
pub use rpc::{invoke, spawn_dispatcher, RemoteCall};
pub use timeout::{timeout, until_cancelled};
pub use tunnel::{Role, Tunnel};
