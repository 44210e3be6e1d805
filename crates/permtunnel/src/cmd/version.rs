use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("permtunnel {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: permtunnel");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "defaults: handshake_interval={:?}, permission_probe_window={:?}, rpc_timeout=none",
        permtunnel_peer::DEFAULT_HANDSHAKE_INTERVAL,
        permtunnel_peer::DEFAULT_PERMISSION_PROBE_WINDOW,
    );
    println!(
        "forwarded_methods: {}",
        [
            permtunnel_peer::rpc::REQUEST_PERMISSION,
            permtunnel_peer::rpc::IS_PERMISSION_GRANTED,
            permtunnel_peer::rpc::SETUP_EVENT_FORWARDING,
            permtunnel_peer::rpc::NOTIFY_PROMPT_SHOWN,
            permtunnel_peer::rpc::NOTIFY_PROMPT_HIDDEN,
        ]
        .join(", ")
    );

    Ok(SUCCESS)
}
