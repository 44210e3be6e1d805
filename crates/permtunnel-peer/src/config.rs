use std::time::Duration;

/// Interval between handshake attempts while waiting for an acknowledgement.
pub const DEFAULT_HANDSHAKE_INTERVAL: Duration = Duration::from_millis(100);

/// How long a permission probe waits for a first sensor event.
pub const DEFAULT_PERMISSION_PROBE_WINDOW: Duration = Duration::from_millis(500);

/// Tunnel behavior knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Retry period of the embedder's handshake loop.
    pub handshake_interval: Duration,
    /// Deadline for the "has this event ever fired" permission probe.
    pub permission_probe_window: Duration,
    /// Upper bound on a forwarded method call. `None` waits forever.
    pub rpc_timeout: Option<Duration>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            handshake_interval: DEFAULT_HANDSHAKE_INTERVAL,
            permission_probe_window: DEFAULT_PERMISSION_PROBE_WINDOW,
            rpc_timeout: None,
        }
    }
}
