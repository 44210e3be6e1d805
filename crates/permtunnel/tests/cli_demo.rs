#![cfg(feature = "cli")]

use std::io::Write;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

fn permtunnel(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_permtunnel"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("permtunnel should run")
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each stdout line should be JSON"))
        .collect()
}

#[test]
fn demo_relays_serialized_events_to_the_frame() {
    let output = permtunnel(&["--format", "json", "demo", "--count", "2"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["kind"], "permission");
    assert_eq!(lines[0]["state"], "granted");
    assert_eq!(lines[0]["prompts"], 1);

    for (seq, line) in lines[1..].iter().enumerate() {
        assert_eq!(line["kind"], "event");
        assert_eq!(line["event_type"], "deviceorientation");
        assert_eq!(line["seq"], seq + 1);
        let event = &line["args"][0];
        assert!(event.get("alpha").is_some());
        assert!(event.get("timeStamp").is_none());
        assert!(event.get("absolute").is_none());
    }
}

#[test]
fn demo_survives_dropped_handshakes() {
    let output = permtunnel(&[
        "--format",
        "json",
        "demo",
        "--event",
        "devicemotion",
        "--count",
        "1",
        "--drop-handshakes",
        "2",
        "--handshake-interval",
        "20ms",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = json_lines(&output);
    assert_eq!(lines.last().unwrap()["args"][0]["interval"], 16);
}

#[test]
fn denied_demo_exits_50() {
    let output = permtunnel(&["--format", "json", "demo", "--deny"]);
    assert_eq!(output.status.code(), Some(50));

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["state"], "denied");
    assert!(String::from_utf8_lossy(&output.stderr).contains("denied"));
}

#[test]
fn inspect_decodes_a_method_call() {
    let output = permtunnel(&[
        "--format",
        "json",
        "inspect",
        r#"{"_iframe_permissions_tunnel":true,"type":"method-call","id":"00ff-0001-0002-0003-0004-0005","method":"requestPermissionFor","args":["deviceorientation"]}"#,
    ]);
    assert!(output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines[0]["type"], "method-call");
    assert_eq!(lines[0]["method"], "requestPermissionFor");
    assert_eq!(lines[0]["args"][0], "deviceorientation");
}

#[test]
fn inspect_reads_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_permtunnel"))
        .args(["--format", "json", "inspect"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("inspect should start");
    let response =
        br#"{"_iframe_permissions_tunnel":true,"type":"method-call-response","id":"a","result":null}"#;
    child.stdin.take().unwrap().write_all(response).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines[0]["type"], "method-call-response");
    assert_eq!(lines[0]["result"], Value::Null);
}

#[test]
fn inspect_rejects_foreign_traffic_with_60() {
    let output = permtunnel(&["inspect", r#"{"type":"handshake","id":"x"}"#]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not tunnel traffic"));
}

#[test]
fn invalid_duration_is_a_usage_error() {
    let output = permtunnel(&["demo", "--timeout", "soon"]);
    assert_eq!(output.status.code(), Some(64));
}
