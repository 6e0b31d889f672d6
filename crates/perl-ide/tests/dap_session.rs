//! Drives the `perl-ide dap` binary over real stdio framing. No Perl
//! interpreter is needed: launch is never issued, so only the protocol
//! surface is exercised.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};

fn spawn_adapter() -> Child {
    Command::new(env!("CARGO_BIN_EXE_perl-ide"))
        .arg("dap")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn perl-ide dap")
}

fn send(stdin: &mut impl Write, seq: u64, command: &str, args: Option<serde_json::Value>) {
    let mut msg = serde_json::json!({
        "seq": seq,
        "type": "request",
        "command": command,
    });
    if let Some(a) = args {
        msg.as_object_mut()
            .unwrap()
            .insert("arguments".to_string(), a);
    }
    let body = serde_json::to_string(&msg).unwrap();
    write!(stdin, "Content-Length: {}\r\n\r\n{}", body.len(), body).unwrap();
    stdin.flush().unwrap();
}

fn recv(reader: &mut BufReader<impl Read>) -> Option<serde_json::Value> {
    let mut content_length: Option<usize> = None;
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let trimmed = header.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(len) = trimmed.strip_prefix("Content-Length:") {
            content_length = len.trim().parse().ok();
        }
    }
    let mut body = vec![0u8; content_length?];
    reader.read_exact(&mut body).ok()?;
    serde_json::from_slice(&body).ok()
}

#[test]
fn initialize_reports_capabilities_without_initialized_event() {
    let mut child = spawn_adapter();
    let mut stdin = child.stdin.take().unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    send(&mut stdin, 1, "initialize", Some(serde_json::json!({})));
    let resp = recv(&mut reader).expect("initialize response");
    assert_eq!(resp["type"], "response");
    assert_eq!(resp["command"], "initialize");
    assert_eq!(resp["success"], true);
    assert_eq!(resp["body"]["supportsConfigurationDoneRequest"], true);
    assert_eq!(resp["body"]["supportsConditionalBreakpoints"], true);
    assert_eq!(resp["body"]["exceptionBreakpointFilters"][0]["filter"], "die");

    // `initialized` only fires after launch; the next reply must be the
    // threads response, not an event.
    send(&mut stdin, 2, "threads", None);
    let resp = recv(&mut reader).expect("threads response");
    assert_eq!(resp["type"], "response");
    assert_eq!(resp["command"], "threads");
    assert_eq!(resp["body"]["threads"][0]["id"], 1);
    assert_eq!(resp["body"]["threads"][0]["name"], "main thread");

    send(&mut stdin, 3, "disconnect", None);
    let resp = recv(&mut reader).expect("disconnect response");
    assert_eq!(resp["command"], "disconnect");
    assert_eq!(resp["success"], true);

    let status = child.wait().expect("adapter exits after disconnect");
    assert!(status.success());
}

#[test]
fn launch_without_program_is_error_1001() {
    let mut child = spawn_adapter();
    let mut stdin = child.stdin.take().unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    send(&mut stdin, 1, "initialize", Some(serde_json::json!({})));
    recv(&mut reader).expect("initialize response");

    send(&mut stdin, 2, "launch", Some(serde_json::json!({})));
    let resp = recv(&mut reader).expect("launch response");
    assert_eq!(resp["success"], false);
    assert_eq!(resp["body"]["error"]["id"], 1001);
    assert_eq!(resp["body"]["error"]["format"], "No program specified to debug.");

    send(&mut stdin, 3, "disconnect", None);
    recv(&mut reader);
    let _ = child.wait();
}

#[test]
fn breakpoints_before_launch_are_recorded_and_verified() {
    let mut child = spawn_adapter();
    let mut stdin = child.stdin.take().unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    send(&mut stdin, 1, "initialize", Some(serde_json::json!({})));
    recv(&mut reader).expect("initialize response");

    send(
        &mut stdin,
        2,
        "setBreakpoints",
        Some(serde_json::json!({
            "source": { "path": "/tmp/script.pl" },
            "breakpoints": [ { "line": 10 }, { "line": 12, "condition": "$x > 1" } ],
        })),
    );
    let resp = recv(&mut reader).expect("setBreakpoints response");
    assert_eq!(resp["success"], true);
    let bps = resp["body"]["breakpoints"].as_array().unwrap();
    assert_eq!(bps.len(), 2);
    assert!(bps.iter().all(|b| b["verified"] == true));
    assert_eq!(bps[0]["line"], 10);
    assert_eq!(bps[1]["line"], 12);

    send(&mut stdin, 3, "disconnect", None);
    recv(&mut reader);
    let _ = child.wait();
}

#[test]
fn unknown_command_is_rejected() {
    let mut child = spawn_adapter();
    let mut stdin = child.stdin.take().unwrap();
    let mut reader = BufReader::new(child.stdout.take().unwrap());

    send(&mut stdin, 1, "fancyNewRequest", None);
    let resp = recv(&mut reader).expect("error response");
    assert_eq!(resp["success"], false);
    assert!(resp["message"]
        .as_str()
        .unwrap()
        .contains("unsupported command"));

    send(&mut stdin, 2, "disconnect", None);
    recv(&mut reader);
    let _ = child.wait();
}
