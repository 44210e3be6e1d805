use std::time::Duration;

use clap::{Args, Subcommand};
use permtunnel_peer::DEVICE_ORIENTATION;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod demo;
pub mod inspect;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an embedder and a frame in-process and relay simulated sensor events.
    Demo(DemoArgs),
    /// Decode one wire message and print its fields.
    Inspect(InspectArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Sensor event type to request and listen for.
    #[arg(long, default_value = DEVICE_ORIENTATION)]
    pub event: String,
    /// Number of simulated events to emit.
    #[arg(long, default_value_t = 3)]
    pub count: usize,
    /// Answer the permission prompt with "deny".
    #[arg(long)]
    pub deny: bool,
    /// Drop the first N handshakes sent to the frame.
    #[arg(long, default_value_t = 0, value_name = "N")]
    pub drop_handshakes: usize,
    /// Interval between handshake attempts (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub handshake_interval: String,
    /// Upper bound on the handshake, each forwarded call and each relayed event.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// JSON text of one message. Read from stdin when omitted.
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_accept_seconds_and_millis() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration(" 3 ").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn durations_reject_zero_and_garbage() {
        assert_eq!(parse_duration("0ms").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("soon").unwrap_err().code, USAGE);
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
