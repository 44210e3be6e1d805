//! Embedder and frame in one process: the frame asks for orientation
//! permission, then receives orientation events captured on the embedder.
//!
//! Run with:
//!   cargo run --example orientation-relay

use std::sync::Arc;
use std::time::Duration;

use permtunnel::peer::{
    FixedGranter, PermissionDecision, Platform, SimulatedSensors, Tunnel, DEVICE_ORIENTATION,
};
use permtunnel::transport::MemoryWindow;
use serde_json::{json, Value};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let top = MemoryWindow::new("top");
    let frame_window = MemoryWindow::new("frame");

    let sensors = Arc::new(SimulatedSensors::new());
    let platform = Platform::new(sensors.clone()).with_granter(
        DEVICE_ORIENTATION,
        Arc::new(FixedGranter::new(PermissionDecision::Granted)),
    );

    let frame = Tunnel::frame(Arc::new(frame_window.clone()), top.port());
    let embedder = Tunnel::embedder(Arc::new(top), platform);
    embedder.on_permission_prompt_shown(|_| eprintln!("[embedder] prompt shown"));
    embedder.forward_to(frame_window.port())?;

    frame.on_permission_granted(|args: &[Value]| eprintln!("[frame] granted {args:?}"));
    frame.notify_permission_prompt_shown().await?;
    if !frame.request_permission_for(DEVICE_ORIENTATION).await? {
        eprintln!("permission denied");
        return Ok(());
    }

    frame
        .add_event_listener(DEVICE_ORIENTATION, |args: &[Value]| {
            eprintln!("[frame] orientation {}", args[0]);
        })
        .await?;

    for step in 0..5 {
        sensors.emit(
            DEVICE_ORIENTATION,
            json!({"alpha": step * 10, "beta": 0, "gamma": 0, "absolute": true}),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Ok(())
}
