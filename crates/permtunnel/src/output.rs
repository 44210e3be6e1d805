use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use permtunnel_channel::{Message, Payload};
use permtunnel_peer::PermissionState;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    kind: &'static str,
    event_type: &'a str,
    seq: usize,
    args: &'a [Value],
    timestamp: String,
}

/// One relayed sensor event as received by a listener.
pub fn print_event(event_type: &str, seq: usize, args: &[Value], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                kind: "event",
                event_type,
                seq,
                args,
                timestamp: now_unix_millis(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["SEQ", "EVENT", "ARGS"]);
            table.add_row(vec![seq.to_string(), event_type.to_string(), compact(args)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("#{seq} {event_type} {}", compact(args));
        }
    }
}

#[derive(Serialize)]
struct PermissionOutput<'a> {
    kind: &'static str,
    event_type: &'a str,
    state: PermissionState,
    prompts: usize,
}

/// Outcome of a permission request, with how many times the user was asked.
pub fn print_permission(
    event_type: &str,
    state: PermissionState,
    prompts: usize,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&PermissionOutput {
            kind: "permission",
            event_type,
            state,
            prompts,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["EVENT", "PERMISSION", "PROMPTS"]);
            table.add_row(vec![
                event_type.to_string(),
                state_name(state).to_string(),
                prompts.to_string(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "permission {event_type}: {} (prompted {prompts}x)",
                state_name(state)
            );
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'static str,
    #[serde(rename = "type")]
    msg_type: &'a str,
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a [Value]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
}

/// A decoded wire message.
pub fn print_message(message: &Message, format: OutputFormat) {
    let msg_type = message.msg_type();
    let mut out = MessageOutput {
        kind: "message",
        msg_type: &msg_type,
        id: message.id(),
        method: None,
        event_type: None,
        args: None,
        result: None,
    };
    match &message.payload {
        Payload::Handshake | Payload::HandshakeAck => {}
        Payload::MethodCall { method, args } => {
            out.method = Some(method.as_str());
            out.args = Some(args.as_slice());
        }
        Payload::MethodCallResponse { result } => out.result = Some(result),
        Payload::EventCallback { event_type, args } => {
            out.event_type = Some(event_type.as_str());
            out.args = Some(args.as_slice());
        }
    }

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["FIELD", "VALUE"]);
            table.add_row(vec!["type".to_string(), out.msg_type.to_string()]);
            table.add_row(vec!["id".to_string(), out.id.unwrap_or("-").to_string()]);
            if let Some(method) = out.method {
                table.add_row(vec!["method".to_string(), method.to_string()]);
            }
            if let Some(event_type) = out.event_type {
                table.add_row(vec!["event".to_string(), event_type.to_string()]);
            }
            if let Some(args) = out.args {
                table.add_row(vec!["args".to_string(), compact(args)]);
            }
            if let Some(result) = out.result {
                table.add_row(vec!["result".to_string(), result.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let id = out.id.unwrap_or("-");
            match (out.method, out.args, out.result) {
                (Some(method), Some(args), _) => {
                    println!("{} id={id} {method}{}", out.msg_type, compact(args))
                }
                (_, Some(args), _) => println!("{} id={id} {}", out.msg_type, compact(args)),
                (_, _, Some(result)) => println!("{} id={id} => {result}", out.msg_type),
                _ => println!("{} id={id}", out.msg_type),
            }
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize>(out: &T) {
    println!(
        "{}",
        serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
    );
}

fn compact(args: &[Value]) -> String {
    Value::from(args.to_vec()).to_string()
}

fn state_name(state: PermissionState) -> &'static str {
    match state {
        PermissionState::Unknown => "unknown",
        PermissionState::Requested => "requested",
        PermissionState::Granted => "granted",
        PermissionState::Denied => "denied",
    }
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
