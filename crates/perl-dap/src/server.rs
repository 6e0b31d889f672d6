//! The DAP session: request routing over stdio, the breakpoint table, the
//! configurationDone gate, variable-handle resolution and the stop-on-entry
//! heuristic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, warn};

use perl_dbg::{
    array_dump_len, classify_value, parse_array_dump, parse_evaluate_result, parse_hash_dump,
    parse_stack_trace, split_variable_entries, strip_scalar_indirection, DebugEvent, LaunchSpec,
    PerlDriver, RunKind, StopReason,
};

use crate::handles::{HandleStore, NestedKind, VariableHandle};
use crate::protocol::{DapEvent, DapRequest, DapResponse, LaunchArguments};
use crate::transport;

const CONFIGURATION_DONE_TIMEOUT: Duration = Duration::from_millis(1000);
const ERR_NO_PROGRAM: u32 = 1001;
const NOT_BREAKABLE_MESSAGE: &str = "Perl cannot set breakpoint here";

// ── Outbound writer ─────────────────────────────────────────────

/// Shared, sequenced writer; the launch task and the request loop both emit
/// through it.
#[derive(Clone)]
struct Outbound {
    writer: Arc<Mutex<tokio::io::Stdout>>,
    seq: Arc<AtomicU64>,
}

impl Outbound {
    fn new() -> Self {
        Outbound {
            writer: Arc::new(Mutex::new(tokio::io::stdout())),
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn write(&self, json: String) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = transport::send_message(&mut *writer, &json).await {
            error!("failed to write DAP message: {e}");
        }
    }

    async fn send_success(&self, request: &DapRequest, command: &str, body: Option<serde_json::Value>) {
        let resp = DapResponse::success(self.next_seq(), request.seq, command, body);
        self.write(serde_json::to_string(&resp).expect("response serializes")).await;
    }

    async fn send_error(&self, request: &DapRequest, command: &str, message: &str) {
        let resp = DapResponse::error(self.next_seq(), request.seq, command, message);
        self.write(serde_json::to_string(&resp).expect("response serializes")).await;
    }

    async fn send_error_with_id(&self, request: &DapRequest, command: &str, id: u32, format: &str) {
        let resp = DapResponse::error_with_id(self.next_seq(), request.seq, command, id, format);
        self.write(serde_json::to_string(&resp).expect("response serializes")).await;
    }

    async fn send_event(&self, event: &str, body: Option<serde_json::Value>) {
        let event = DapEvent::new(self.next_seq(), event, body);
        self.write(serde_json::to_string(&event).expect("event serializes")).await;
    }
}

// ── configurationDone gate ──────────────────────────────────────

struct ConfigGate {
    done: AtomicBool,
    notify: Notify,
}

impl ConfigGate {
    fn new() -> Self {
        ConfigGate {
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn signal(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait for configurationDone, but never longer than the launch
    /// timeout; launch proceeds regardless.
    async fn wait(&self) {
        let deadline = tokio::time::sleep(CONFIGURATION_DONE_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            if self.done.load(Ordering::SeqCst) {
                return;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = &mut deadline => return,
            }
        }
    }
}

// ── Breakpoints ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct BreakpointSpec {
    line: u32,
    condition: Option<String>,
}

type BreakpointTable = HashMap<String, Vec<BreakpointSpec>>;

fn breakpoint_recorded(table: &BreakpointTable, file: &str, line: u32) -> bool {
    table.iter().any(|(path, bps)| {
        (path.ends_with(file) || file.ends_with(path.as_str()))
            && bps.iter().any(|b| b.line == line)
    })
}

// ── Session ─────────────────────────────────────────────────────

struct Session {
    out: Outbound,
    driver: Arc<RwLock<Option<Arc<PerlDriver>>>>,
    breakpoints: Arc<Mutex<BreakpointTable>>,
    handles: HandleStore,
    gate: Arc<ConfigGate>,
    bridge_tx: mpsc::UnboundedSender<DebugEvent>,
    stop_on_entry: Arc<AtomicBool>,
    passed_stop_on_entry: bool,
}

pub async fn run() {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let out = Outbound::new();
    let (bridge_tx, mut bridge_rx) = mpsc::unbounded_channel::<DebugEvent>();

    let mut session = Session {
        out,
        driver: Arc::new(RwLock::new(None)),
        breakpoints: Arc::new(Mutex::new(BreakpointTable::new())),
        handles: HandleStore::default(),
        gate: Arc::new(ConfigGate::new()),
        bridge_tx,
        stop_on_entry: Arc::new(AtomicBool::new(false)),
        passed_stop_on_entry: false,
    };

    loop {
        tokio::select! {
            msg = transport::recv_message(&mut reader) => {
                match msg {
                    Ok(Some(text)) => {
                        let request: DapRequest = match serde_json::from_str(&text) {
                            Ok(r) => r,
                            Err(e) => {
                                warn!("unparseable DAP message ({e}): {text}");
                                continue;
                            }
                        };
                        if !session.handle_request(&request).await {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("DAP read error: {e}");
                        break;
                    }
                }
            }
            Some(event) = bridge_rx.recv() => {
                session.handle_debug_event(event).await;
            }
        }
    }
}

impl Session {
    async fn driver(&self) -> Option<Arc<PerlDriver>> {
        self.driver.read().await.clone()
    }

    async fn handle_debug_event(&mut self, event: DebugEvent) {
        match event {
            DebugEvent::Stopped { reason } => {
                let reason = match reason {
                    StopReason::Breakpoint => "breakpoint",
                    StopReason::Step => "step",
                    StopReason::Pause => "pause",
                    StopReason::Entry => "entry",
                };
                self.out
                    .send_event(
                        "stopped",
                        Some(serde_json::json!({
                            "reason": reason,
                            "threadId": 1,
                            "allThreadsStopped": true,
                        })),
                    )
                    .await;
            }
            DebugEvent::Continued => {
                // Any resume invalidates every outstanding handle.
                self.handles.clear();
                self.out
                    .send_event(
                        "continued",
                        Some(serde_json::json!({
                            "threadId": 1,
                            "allThreadsContinued": true,
                        })),
                    )
                    .await;
            }
            DebugEvent::Paused => {
                self.out
                    .send_event(
                        "stopped",
                        Some(serde_json::json!({
                            "reason": "pause",
                            "threadId": 1,
                            "allThreadsStopped": true,
                        })),
                    )
                    .await;
            }
            DebugEvent::Terminated { exit_code } => {
                self.out
                    .send_event(
                        "exited",
                        Some(serde_json::json!({ "exitCode": exit_code.unwrap_or(0) })),
                    )
                    .await;
                self.out.send_event("terminated", None).await;
            }
            DebugEvent::Output { category, output } => {
                self.out
                    .send_event(
                        "output",
                        Some(serde_json::json!({ "category": category, "output": output })),
                    )
                    .await;
            }
        }
    }

    /// Returns false when the session should end.
    async fn handle_request(&mut self, request: &DapRequest) -> bool {
        let Some(command) = request.command.clone() else {
            return true;
        };
        debug!(command, seq = request.seq, "DAP request");

        match command.as_str() {
            "initialize" => {
                self.out
                    .send_success(request, "initialize", Some(capabilities()))
                    .await;
                // `initialized` is deliberately delayed until launch has
                // wired up the debugger.
            }
            "launch" => self.handle_launch(request).await,
            "configurationDone" => {
                self.gate.signal();
                self.out.send_success(request, "configurationDone", None).await;
            }
            "threads" => {
                self.out
                    .send_success(
                        request,
                        "threads",
                        Some(serde_json::json!({
                            "threads": [{ "id": 1, "name": "main thread" }]
                        })),
                    )
                    .await;
            }
            "setBreakpoints" => self.handle_set_breakpoints(request).await,
            "stackTrace" => self.handle_stack_trace(request).await,
            "scopes" => {
                let locals = self.handles.mint(VariableHandle::Locals);
                let globals = self.handles.mint(VariableHandle::Globals);
                self.out
                    .send_success(
                        request,
                        "scopes",
                        Some(serde_json::json!({
                            "scopes": [
                                {
                                    "name": "Locals & Closure",
                                    "variablesReference": locals,
                                    "expensive": false,
                                },
                                {
                                    "name": "Globals",
                                    "variablesReference": globals,
                                    "expensive": true,
                                },
                            ]
                        })),
                    )
                    .await;
            }
            "variables" => self.handle_variables(request).await,
            "evaluate" => self.handle_evaluate(request).await,
            "continue" => {
                self.dispatch_run(RunKind::Continue).await;
                self.out
                    .send_success(
                        request,
                        "continue",
                        Some(serde_json::json!({ "allThreadsContinued": true })),
                    )
                    .await;
            }
            "next" => {
                self.dispatch_run(RunKind::Next).await;
                self.out.send_success(request, "next", None).await;
            }
            "stepIn" => {
                self.dispatch_run(RunKind::StepInto).await;
                self.out.send_success(request, "stepIn", None).await;
            }
            "stepOut" => {
                self.dispatch_run(RunKind::StepOut).await;
                self.out.send_success(request, "stepOut", None).await;
            }
            "restart" => {
                self.dispatch_run(RunKind::Restart).await;
                self.out.send_success(request, "restart", None).await;
            }
            "pause" => {
                if let Some(driver) = self.driver().await {
                    driver.pause();
                }
                self.out.send_success(request, "pause", None).await;
            }
            "setVariable" => self.handle_set_variable(request).await,
            "setExpression" => self.handle_set_expression(request).await,
            "breakpointLocations" => {
                let line = request
                    .arguments
                    .as_ref()
                    .and_then(|a| a.get("line"))
                    .and_then(|l| l.as_u64())
                    .unwrap_or(1);
                self.out
                    .send_success(
                        request,
                        "breakpointLocations",
                        Some(serde_json::json!({ "breakpoints": [{ "line": line }] })),
                    )
                    .await;
            }
            "completions" => {
                self.out
                    .send_success(
                        request,
                        "completions",
                        Some(serde_json::json!({ "targets": [] })),
                    )
                    .await;
            }
            "setExceptionBreakpoints" => {
                // The `die` filter is advertised but has no backing
                // implementation in the perl -d driver.
                self.out
                    .send_success(
                        request,
                        "setExceptionBreakpoints",
                        Some(serde_json::json!({ "breakpoints": [] })),
                    )
                    .await;
            }
            "setFunctionBreakpoints" => {
                self.out
                    .send_success(
                        request,
                        "setFunctionBreakpoints",
                        Some(serde_json::json!({ "breakpoints": [] })),
                    )
                    .await;
            }
            "exceptionInfo" => {
                self.out
                    .send_success(
                        request,
                        "exceptionInfo",
                        Some(serde_json::json!({
                            "exceptionId": "die",
                            "breakMode": "unhandled",
                        })),
                    )
                    .await;
            }
            "stepInTargets" => {
                self.out
                    .send_success(
                        request,
                        "stepInTargets",
                        Some(serde_json::json!({ "targets": [] })),
                    )
                    .await;
            }
            "disassemble" => {
                self.out
                    .send_success(
                        request,
                        "disassemble",
                        Some(serde_json::json!({ "instructions": [] })),
                    )
                    .await;
            }
            "readMemory" => {
                self.out
                    .send_success(
                        request,
                        "readMemory",
                        Some(serde_json::json!({ "address": "0x0", "unreadableBytes": 0 })),
                    )
                    .await;
            }
            "writeMemory" => {
                self.out
                    .send_success(
                        request,
                        "writeMemory",
                        Some(serde_json::json!({ "bytesWritten": 0 })),
                    )
                    .await;
            }
            "cancel" => {
                // An in-flight debugger command always runs to its next
                // prompt; cancellation is accepted and ignored.
                self.out.send_success(request, "cancel", None).await;
            }
            "terminate" => {
                if let Some(driver) = self.driver().await {
                    driver.kill();
                }
                self.out.send_success(request, "terminate", None).await;
            }
            "disconnect" => {
                if let Some(driver) = self.driver().await {
                    driver.kill();
                }
                self.out.send_success(request, "disconnect", None).await;
                return false;
            }
            other => {
                self.out
                    .send_error(request, other, &format!("unsupported command: {other}"))
                    .await;
            }
        }
        true
    }

    async fn handle_launch(&mut self, request: &DapRequest) {
        let args: LaunchArguments = request
            .arguments
            .clone()
            .map(|v| serde_json::from_value(v).unwrap_or_default())
            .unwrap_or_default();

        let Some(program) = args.program.clone() else {
            self.out
                .send_error_with_id(
                    request,
                    "launch",
                    ERR_NO_PROGRAM,
                    "No program specified to debug.",
                )
                .await;
            return;
        };

        debug!(
            stop_on_entry = args.stop_on_entry,
            trace = args.trace,
            "launching debuggee"
        );
        self.stop_on_entry.store(args.stop_on_entry, Ordering::SeqCst);

        let spec = LaunchSpec {
            program: PathBuf::from(program),
            args: args.argv(),
            cwd: args.cwd.as_ref().map(PathBuf::from),
            env: args.env.clone(),
        };

        let out = self.out.clone();
        let driver_slot = Arc::clone(&self.driver);
        let breakpoints = Arc::clone(&self.breakpoints);
        let gate = Arc::clone(&self.gate);
        let bridge_tx = self.bridge_tx.clone();
        let request_seq = request.seq;

        tokio::spawn(async move {
            gate.wait().await;

            let (driver, mut events) = match PerlDriver::spawn(spec).await {
                Ok(pair) => pair,
                Err(e) => {
                    let resp = DapResponse::error(
                        out.next_seq(),
                        request_seq,
                        "launch",
                        &format!("Failed to launch perl -d: {e}"),
                    );
                    out.write(serde_json::to_string(&resp).expect("response serializes")).await;
                    return;
                }
            };
            let driver = Arc::new(driver);
            *driver_slot.write().await = Some(Arc::clone(&driver));

            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if bridge_tx.send(event).is_err() {
                        break;
                    }
                }
            });

            if let Err(e) = driver.auto_flush_stdout().await {
                warn!("autoflush failed: {e}");
            }

            // Breakpoints recorded before launch are applied now.
            let recorded = breakpoints.lock().await.clone();
            for (path, bps) in recorded {
                for bp in bps {
                    let _ = driver
                        .set_breakpoint(&path, bp.line, bp.condition.as_deref())
                        .await;
                }
            }

            let resp = DapResponse::success(out.next_seq(), request_seq, "launch", None);
            out.write(serde_json::to_string(&resp).expect("response serializes")).await;
            out.send_event("initialized", None).await;
            out.send_event(
                "stopped",
                Some(serde_json::json!({
                    "reason": "entry",
                    "threadId": 1,
                    "allThreadsStopped": true,
                })),
            )
            .await;
        });
    }

    async fn handle_set_breakpoints(&mut self, request: &DapRequest) {
        let args = request.arguments.as_ref();
        let path = args
            .and_then(|a| a.get("source"))
            .and_then(|s| s.get("path"))
            .and_then(|p| p.as_str())
            .unwrap_or_default()
            .to_string();
        let requested: Vec<BreakpointSpec> = args
            .and_then(|a| a.get("breakpoints"))
            .and_then(|b| b.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|bp| {
                        let line = bp.get("line").and_then(|l| l.as_u64())? as u32;
                        let condition = bp
                            .get("condition")
                            .and_then(|c| c.as_str())
                            .map(str::to_string);
                        Some(BreakpointSpec { line, condition })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut verdicts: Vec<(u32, bool)> = Vec::new();
        if let Some(driver) = self.driver().await {
            let previous: Vec<u32> = self
                .breakpoints
                .lock()
                .await
                .get(&path)
                .map(|bps| bps.iter().map(|b| b.line).collect())
                .unwrap_or_default();
            if let Err(e) = driver.delete_breakpoints(&previous).await {
                warn!("deleting old breakpoints failed: {e}");
            }
            for bp in &requested {
                let verified = match driver
                    .set_breakpoint(&path, bp.line, bp.condition.as_deref())
                    .await
                {
                    Ok(reply) => !reply.contains("not breakable"),
                    Err(_) => false,
                };
                verdicts.push((bp.line, verified));
            }
        } else {
            verdicts = requested.iter().map(|b| (b.line, true)).collect();
        }

        self.breakpoints.lock().await.insert(path, requested);

        let breakpoints: Vec<serde_json::Value> = verdicts
            .iter()
            .map(|(line, verified)| {
                if *verified {
                    serde_json::json!({ "verified": true, "line": line })
                } else {
                    serde_json::json!({
                        "verified": false,
                        "line": line,
                        "message": NOT_BREAKABLE_MESSAGE,
                    })
                }
            })
            .collect();
        self.out
            .send_success(
                request,
                "setBreakpoints",
                Some(serde_json::json!({ "breakpoints": breakpoints })),
            )
            .await;
    }

    async fn handle_stack_trace(&mut self, request: &DapRequest) {
        let start_frame = request
            .arguments
            .as_ref()
            .and_then(|a| a.get("startFrame"))
            .and_then(|s| s.as_u64())
            .unwrap_or(0);
        // Delayed loading is advertised but pages beyond the first are
        // never served; the first response always carries the whole stack.
        if start_frame != 0 {
            self.out
                .send_success(
                    request,
                    "stackTrace",
                    Some(serde_json::json!({ "stackFrames": [], "totalFrames": 0 })),
                )
                .await;
            return;
        }

        let Some(driver) = self.driver().await else {
            self.out
                .send_error(request, "stackTrace", "no debuggee running")
                .await;
            return;
        };

        let reply = match driver.trace().await {
            Ok(r) => r,
            Err(e) => {
                self.out
                    .send_error(request, "stackTrace", &format!("trace failed: {e}"))
                    .await;
                return;
            }
        };
        let frames = parse_stack_trace(&reply);

        let stack_frames: Vec<serde_json::Value> = frames
            .iter()
            .enumerate()
            .map(|(i, f)| {
                serde_json::json!({
                    "id": i as i64 + 1,
                    "name": format!(":({}) {}", f.context.as_str(), f.callee),
                    "source": {
                        "name": Path::new(&f.caller_file)
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| f.caller_file.clone()),
                        "path": f.caller_file,
                    },
                    "line": f.line,
                    "column": 1,
                })
            })
            .collect();

        self.out
            .send_success(
                request,
                "stackTrace",
                Some(serde_json::json!({
                    "stackFrames": stack_frames,
                    "totalFrames": stack_frames.len(),
                })),
            )
            .await;

        // Stop-on-entry heuristic, observed behavior: the first stack trace
        // silently resumes unless the user asked to stop or a breakpoint
        // sits on the entry line.
        if !self.passed_stop_on_entry {
            self.passed_stop_on_entry = true;
            if !self.stop_on_entry.load(Ordering::SeqCst) {
                let entry_break = match frames.first() {
                    Some(top) => {
                        let table = self.breakpoints.lock().await;
                        breakpoint_recorded(&table, &top.caller_file, top.line)
                    }
                    None => false,
                };
                if !entry_break {
                    self.dispatch_run(RunKind::Continue).await;
                }
            }
        }
    }

    async fn handle_variables(&mut self, request: &DapRequest) {
        let reference = request
            .arguments
            .as_ref()
            .and_then(|a| a.get("variablesReference"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let handle = self.handles.get(reference).cloned();
        let variables = match handle {
            None => Vec::new(),
            Some(VariableHandle::Locals) => self.scope_variables(false).await,
            Some(VariableHandle::Globals) => self.scope_variables(true).await,
            Some(VariableHandle::Nested { kind, raw }) => match kind {
                NestedKind::Array => parse_array_dump(&raw)
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| self.render_variable(i.to_string(), value))
                    .collect(),
                NestedKind::Hash => parse_hash_dump(&raw)
                    .into_iter()
                    .map(|(key, value)| self.render_variable(key, value))
                    .collect(),
                NestedKind::Scalar => {
                    let value = strip_scalar_indirection(&raw);
                    vec![self.render_variable("->".to_string(), value)]
                }
            },
        };

        self.out
            .send_success(
                request,
                "variables",
                Some(serde_json::json!({ "variables": variables })),
            )
            .await;
    }

    /// Run `y` (locals) or `V` (globals) and prettify each entry. Handles
    /// are only valid while stopped; a dead driver yields an empty list.
    async fn scope_variables(&mut self, globals: bool) -> Vec<serde_json::Value> {
        let Some(driver) = self.driver().await else {
            return Vec::new();
        };
        let reply = if globals {
            driver.global_variables().await
        } else {
            driver.local_variables().await
        };
        let Ok(reply) = reply else {
            return Vec::new();
        };
        split_variable_entries(&reply)
            .into_iter()
            .map(|entry| self.render_variable(entry.name, entry.value))
            .collect()
    }

    fn render_variable(&mut self, name: String, value: String) -> serde_json::Value {
        let (display, reference) = prettify_value(&mut self.handles, &name, &value);
        serde_json::json!({
            "name": name,
            "value": display,
            "variablesReference": reference,
        })
    }

    async fn handle_evaluate(&mut self, request: &DapRequest) {
        let expression = request
            .arguments
            .as_ref()
            .and_then(|a| a.get("expression"))
            .and_then(|e| e.as_str())
            .unwrap_or_default()
            .to_string();

        let Some(driver) = self.driver().await else {
            self.out
                .send_error(request, "evaluate", "no debuggee running")
                .await;
            return;
        };

        let reply = match driver.evaluate(&expression).await {
            Ok(r) => r,
            Err(e) => {
                self.out
                    .send_error(request, "evaluate", &format!("evaluate failed: {e}"))
                    .await;
                return;
            }
        };
        let result = parse_evaluate_result(&expression, &reply);

        let reference = if expression.trim_start().starts_with('@') {
            self.handles.mint(VariableHandle::Nested {
                kind: NestedKind::Array,
                raw: result.clone(),
            })
        } else {
            match NestedKind::from_value_kind(classify_value(&result)) {
                Some(kind) => self.handles.mint(VariableHandle::Nested {
                    kind,
                    raw: result.clone(),
                }),
                None => 0,
            }
        };

        self.out
            .send_success(
                request,
                "evaluate",
                Some(serde_json::json!({
                    "result": result,
                    "variablesReference": reference,
                })),
            )
            .await;
    }

    async fn handle_set_variable(&mut self, request: &DapRequest) {
        let args = request.arguments.as_ref();
        let name = args
            .and_then(|a| a.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let value = args
            .and_then(|a| a.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.assign_and_respond(request, "setVariable", format!("{name} = {value}"), &name)
            .await;
    }

    async fn handle_set_expression(&mut self, request: &DapRequest) {
        let args = request.arguments.as_ref();
        let expression = args
            .and_then(|a| a.get("expression"))
            .and_then(|e| e.as_str())
            .unwrap_or_default()
            .to_string();
        let value = args
            .and_then(|a| a.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        self.assign_and_respond(
            request,
            "setExpression",
            format!("{expression} = {value}"),
            &expression,
        )
        .await;
    }

    /// Both setVariable and setExpression are an assignment evaluated in
    /// the debuggee followed by a read-back of the assigned name.
    async fn assign_and_respond(
        &mut self,
        request: &DapRequest,
        command: &str,
        assignment: String,
        read_back: &str,
    ) {
        let Some(driver) = self.driver().await else {
            self.out.send_error(request, command, "no debuggee running").await;
            return;
        };
        if let Err(e) = driver.evaluate(&assignment).await {
            self.out
                .send_error(request, command, &format!("assignment failed: {e}"))
                .await;
            return;
        }
        let value = match driver.evaluate(read_back).await {
            Ok(reply) => parse_evaluate_result(read_back, &reply),
            Err(_) => String::new(),
        };
        self.out
            .send_success(request, command, Some(serde_json::json!({ "value": value })))
            .await;
    }

    async fn dispatch_run(&mut self, kind: RunKind) {
        let Some(driver) = self.driver().await else {
            return;
        };
        match driver.start_run(kind).await {
            Ok(handle) => {
                // The reply arrives at the next stop; the handle keeps the
                // single-flight lock until then.
                tokio::spawn(async move {
                    let _ = handle.wait().await;
                });
            }
            Err(e) => warn!("run command failed: {e}"),
        }
    }
}

/// Display shaping plus handle minting for one dumped value.
fn prettify_value(handles: &mut HandleStore, name: &str, value: &str) -> (String, i64) {
    if name.starts_with('@') {
        let len = array_dump_len(value);
        let reference = handles.mint(VariableHandle::Nested {
            kind: NestedKind::Array,
            raw: value.to_string(),
        });
        return (format!("[{len}] {value}"), reference);
    }
    if name.starts_with('%') {
        let reference = handles.mint(VariableHandle::Nested {
            kind: NestedKind::Hash,
            raw: value.to_string(),
        });
        return (value.to_string(), reference);
    }
    match NestedKind::from_value_kind(classify_value(value)) {
        Some(kind) => {
            let reference = handles.mint(VariableHandle::Nested {
                kind,
                raw: value.to_string(),
            });
            (value.to_string(), reference)
        }
        None => (value.to_string(), 0),
    }
}

fn capabilities() -> serde_json::Value {
    serde_json::json!({
        "supportsConfigurationDoneRequest": true,
        "supportsEvaluateForHovers": true,
        "supportsConditionalBreakpoints": true,
        "supportsLogPoints": true,
        "supportsCompletionsRequest": true,
        "completionTriggerCharacters": [".", ":", "$", "%", "@"],
        "supportsBreakpointLocationsRequest": true,
        "supportsFunctionBreakpoints": true,
        "supportsStepInTargetsRequest": false,
        "supportsExceptionInfoRequest": true,
        "supportsSetVariable": true,
        "supportsSetExpression": true,
        "supportsDisassembleRequest": true,
        "supportsSteppingGranularity": true,
        "supportsInstructionBreakpoints": true,
        "supportsReadMemoryRequest": true,
        "supportsWriteMemoryRequest": true,
        "supportsSuspendDebuggee": true,
        "supportsTerminateDebuggee": true,
        "supportsDelayedStackTraceLoading": true,
        "exceptionBreakpointFilters": [
            { "filter": "die", "label": "Uncaught Exception" }
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_advertise_the_full_surface() {
        let caps = capabilities();
        assert_eq!(caps["supportsConfigurationDoneRequest"], true);
        assert_eq!(caps["supportsStepInTargetsRequest"], false);
        assert_eq!(caps["supportsDelayedStackTraceLoading"], true);
        assert_eq!(caps["exceptionBreakpointFilters"][0]["filter"], "die");
        assert_eq!(
            caps["exceptionBreakpointFilters"][0]["label"],
            "Uncaught Exception"
        );
    }

    #[test]
    fn array_entries_show_length_and_mint_array_handles() {
        let mut handles = HandleStore::default();
        let raw = "(\n  0  1\n  1  HASH(0x1)\n     'k' => 'v'\n)";
        let (display, reference) = prettify_value(&mut handles, "@xs", raw);
        assert!(display.starts_with("[2] ("));
        assert!(reference > 0);
        assert!(matches!(
            handles.get(reference),
            Some(VariableHandle::Nested {
                kind: NestedKind::Array,
                ..
            })
        ));
    }

    #[test]
    fn nested_hash_children_expand_one_level() {
        let mut handles = HandleStore::default();
        let raw = "(\n  0  1\n  1  HASH(0x1)\n     'k' => 'v'\n)";
        let values = parse_array_dump(raw);
        assert_eq!(values[0], "1");

        let (leaf_display, leaf_ref) = prettify_value(&mut handles, "0", &values[0]);
        assert_eq!(leaf_display, "1");
        assert_eq!(leaf_ref, 0);

        let (hash_display, hash_ref) = prettify_value(&mut handles, "1", &values[1]);
        assert_eq!(hash_display, "HASH(0x1)\n   'k' => 'v'");
        let Some(VariableHandle::Nested { kind, raw }) = handles.get(hash_ref) else {
            panic!("expected nested hash handle");
        };
        assert_eq!(*kind, NestedKind::Hash);
        assert_eq!(parse_hash_dump(raw), vec![("k".to_string(), "v".to_string())]);
    }

    #[test]
    fn scalar_addresses_mint_indirection_handles() {
        let mut handles = HandleStore::default();
        let (_, reference) = prettify_value(&mut handles, "$ref", "SCALAR(0x2a)\n-> 42");
        assert!(matches!(
            handles.get(reference),
            Some(VariableHandle::Nested {
                kind: NestedKind::Scalar,
                ..
            })
        ));
    }

    #[test]
    fn breakpoint_lookup_matches_by_path_suffix() {
        let mut table = BreakpointTable::new();
        table.insert(
            "/home/me/project/script.pl".to_string(),
            vec![BreakpointSpec {
                line: 10,
                condition: None,
            }],
        );
        assert!(breakpoint_recorded(&table, "script.pl", 10));
        assert!(breakpoint_recorded(&table, "/home/me/project/script.pl", 10));
        assert!(!breakpoint_recorded(&table, "script.pl", 11));
        assert!(!breakpoint_recorded(&table, "other.pl", 10));
    }
}
