use std::sync::Arc;
use std::time::Duration;

use permtunnel_peer::{
    timeout, FixedGranter, PermissionDecision, Platform, SimulatedSensors, Tunnel, TunnelConfig,
    DEVICE_MOTION, DEVICE_ORIENTATION,
};
use permtunnel_transport::{LossyPort, MemoryWindow, PortHandle};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::cmd::{parse_duration, DemoArgs};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, INTERNAL, PERMISSION_DENIED, SUCCESS};
use crate::output::{print_event, print_permission, OutputFormat};

pub fn run(args: DemoArgs, format: OutputFormat) -> CliResult<i32> {
    let limit = parse_duration(&args.timeout)?;
    let handshake_interval = parse_duration(&args.handshake_interval)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start runtime: {err}")))?;
    runtime.block_on(relay(args, handshake_interval, limit, format))
}

async fn relay(
    args: DemoArgs,
    handshake_interval: Duration,
    limit: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    let top = MemoryWindow::new("top");
    let frame_window = MemoryWindow::new("frame");

    let sensors = Arc::new(SimulatedSensors::new());
    let decision = if args.deny {
        PermissionDecision::Denied
    } else {
        PermissionDecision::Granted
    };
    let granter = Arc::new(FixedGranter::new(decision));
    let platform = Platform::new(sensors.clone()).with_granter(&args.event, granter.clone());
    let config = TunnelConfig {
        handshake_interval,
        rpc_timeout: Some(limit),
        ..TunnelConfig::default()
    };

    let frame =
        Tunnel::frame_with_config(Arc::new(frame_window.clone()), top.port(), config.clone());
    let embedder = Tunnel::embedder_with_config(Arc::new(top), platform, config);

    let target: PortHandle = if args.drop_handshakes > 0 {
        Arc::new(LossyPort::drop_first(frame_window.port(), args.drop_handshakes))
    } else {
        frame_window.port()
    };
    embedder
        .forward_to(target)
        .map_err(|err| peer_error("forward failed", err))?;

    timeout(frame.wait_for_handshake(), limit)
        .await
        .map_err(|err| peer_error("handshake failed", err))?;
    tracing::info!(event_type = %args.event, "tunnel connected");

    let granted = frame
        .request_permission_for(&args.event)
        .await
        .map_err(|err| peer_error("permission request failed", err))?;
    print_permission(
        &args.event,
        frame.permission_state(&args.event),
        granter.requests(),
        format,
    );
    if !granted {
        return Err(CliError::new(
            PERMISSION_DENIED,
            format!("permission for {} denied", args.event),
        ));
    }

    let (tx, mut relayed) = mpsc::unbounded_channel();
    let added = frame
        .add_event_listener(&args.event, move |event_args: &[Value]| {
            let _ = tx.send(event_args.to_vec());
        })
        .await
        .map_err(|err| peer_error("add listener failed", err))?;
    if !added {
        return Err(CliError::new(
            PERMISSION_DENIED,
            format!("listener for {} not registered", args.event),
        ));
    }

    for seq in 1..=args.count {
        sensors.emit(&args.event, sample_event(&args.event, seq));
        let event_args = timeout(relayed.recv(), limit)
            .await
            .map_err(|err| peer_error("event relay failed", err))?
            .ok_or_else(|| CliError::new(FAILURE, "listener dropped"))?;
        print_event(&args.event, seq, &event_args, format);
    }

    frame.shutdown();
    embedder.shutdown();
    Ok(SUCCESS)
}

/// A native event carrying more than the tunnel forwards.
fn sample_event(event_type: &str, seq: usize) -> Value {
    let step = seq as f64;
    match event_type {
        DEVICE_ORIENTATION => json!({
            "alpha": (step * 15.0) % 360.0,
            "beta": step - 2.0,
            "gamma": -step,
            "absolute": false,
            "timeStamp": seq * 16,
        }),
        DEVICE_MOTION => json!({
            "acceleration": {"x": step * 0.1, "y": 0.0, "z": 0.0},
            "accelerationIncludingGravity": {"x": step * 0.1, "y": 0.0, "z": -9.81},
            "rotationRate": {"alpha": 0.0, "beta": step, "gamma": 0.0},
            "interval": 16,
            "timeStamp": seq * 16,
        }),
        _ => json!({"seq": seq}),
    }
}

#[cfg(test)]
mod tests {
    use permtunnel_peer::EventSerializers;

    use super::*;

    #[test]
    fn sample_events_carry_fields_the_tunnel_drops() {
        let serializers = EventSerializers::default();
        for event_type in [DEVICE_ORIENTATION, DEVICE_MOTION] {
            let event = sample_event(event_type, 2);
            let forwarded = serializers.serialize(event_type, &event);
            assert!(event.get("timeStamp").is_some());
            assert!(forwarded.get("timeStamp").is_none());
        }
        assert_eq!(sample_event("battery", 4), json!({"seq": 4}));
    }
}
