//! Owns the `perl -d` child process.
//!
//! The debugger has no request ids; replies are correlated purely by prompt
//! boundaries. Every public operation is serialized behind one fair mutex
//! (the single-flight contract) and a FIFO of waiters pairs the n-th prompt
//! with the n-th written command. Run commands hand back a [`RunHandle`]
//! that keeps the flight lock until the debuggee stops again.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex, Notify, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::parse::PROMPT_RE;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to spawn perl: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("debugger terminated")]
    Terminated,

    #[error("debugger I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the debuggee stopped, derived from the command that was running when
/// the prompt reappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Breakpoint,
    Step,
    Pause,
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    Stopped { reason: StopReason },
    Continued,
    Paused,
    Terminated { exit_code: Option<i32> },
    Output { category: String, output: String },
}

/// Commands that resume the debuggee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Continue,
    Next,
    StepInto,
    StepOut,
    Restart,
}

impl RunKind {
    fn command(self) -> &'static str {
        match self {
            RunKind::Continue => "c",
            RunKind::Next => "n",
            RunKind::StepInto => "s",
            RunKind::StepOut => "o",
            RunKind::Restart => "R",
        }
    }

    fn stop_reason(self) -> StopReason {
        match self {
            RunKind::Continue => StopReason::Breakpoint,
            RunKind::Next | RunKind::StepInto | RunKind::StepOut => StopReason::Step,
            RunKind::Restart => StopReason::Entry,
        }
    }

    /// Only full resumption notifies the client before the write.
    fn announces_continued(self) -> bool {
        matches!(self, RunKind::Continue | RunKind::Restart)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

struct Shared {
    waiters: std::sync::Mutex<VecDeque<oneshot::Sender<String>>>,
    pending_stop: std::sync::Mutex<Option<StopReason>>,
    pause_pending: AtomicBool,
    events: mpsc::UnboundedSender<DebugEvent>,
}

pub struct PerlDriver {
    shared: Arc<Shared>,
    stdin: Mutex<ChildStdin>,
    flight: Arc<Mutex<()>>,
    kill_notify: Arc<Notify>,
    pid: u32,
}

/// An in-flight run command. Holds the flight lock; awaiting it yields the
/// output produced up to the next prompt.
pub struct RunHandle {
    rx: oneshot::Receiver<String>,
    _permit: OwnedMutexGuard<()>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<String, DriverError> {
        self.rx.await.map_err(|_| DriverError::Terminated)
    }
}

impl PerlDriver {
    /// Spawn `perl -d` and wait for the debugger banner prompt. The returned
    /// receiver carries every event the driver emits for the child's
    /// lifetime.
    pub async fn spawn(
        spec: LaunchSpec,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DebugEvent>), DriverError> {
        let mut cmd = Command::new("perl");
        cmd.arg("-d")
            .arg(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&spec.env);

        let mut child = cmd.spawn().map_err(DriverError::Spawn)?;
        let pid = child.id().unwrap_or(0);
        debug!(pid, program = %spec.program.display(), "spawned perl -d");

        let stdin = child.stdin.take().ok_or(DriverError::Terminated)?;
        let stdout = child.stdout.take().ok_or(DriverError::Terminated)?;
        let stderr = child.stderr.take().ok_or(DriverError::Terminated)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            waiters: std::sync::Mutex::new(VecDeque::new()),
            pending_stop: std::sync::Mutex::new(None),
            pause_pending: AtomicBool::new(false),
            events: events_tx.clone(),
        });

        // The debugger greets with a banner and its first prompt before any
        // command is accepted; park a waiter for it so later replies pair
        // one-to-one with written commands.
        let (banner_tx, banner_rx) = oneshot::channel();
        shared.waiters.lock().unwrap().push_back(banner_tx);

        // Debugger chatter arrives on stderr; scan it for prompts.
        let reader_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            let mut stderr = stderr;
            let mut buf = String::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        buf.push_str(&String::from_utf8_lossy(&chunk[..n]));
                        if PROMPT_RE.is_match(&buf) {
                            let reply = std::mem::take(&mut buf);
                            deliver_prompt(&reader_shared, reply);
                        }
                    }
                }
            }
            // Child is gone: fail any parked waiters by dropping them.
            reader_shared.waiters.lock().unwrap().clear();
        });

        // Program output arrives on stdout once autoflush is on.
        let out_events = events_tx.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            let mut chunk = [0u8; 4096];
            loop {
                match stdout.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let _ = out_events.send(DebugEvent::Output {
                            category: "stdout".to_string(),
                            output: String::from_utf8_lossy(&chunk[..n]).into_owned(),
                        });
                    }
                }
            }
        });

        let kill_notify = Arc::new(Notify::new());
        let wait_notify = Arc::clone(&kill_notify);
        let wait_events = events_tx;
        tokio::spawn(async move {
            let exit_code = tokio::select! {
                status = child.wait() => status.ok().and_then(|s| s.code()),
                _ = wait_notify.notified() => {
                    let _ = child.start_kill();
                    child.wait().await.ok().and_then(|s| s.code())
                }
            };
            let _ = wait_events.send(DebugEvent::Terminated { exit_code });
        });

        banner_rx.await.map_err(|_| DriverError::Terminated)?;

        Ok((
            PerlDriver {
                shared,
                stdin: Mutex::new(stdin),
                flight: Arc::new(Mutex::new(())),
                kill_notify,
                pid,
            },
            events_rx,
        ))
    }

    async fn write_command(&self, command: &str) -> Result<oneshot::Receiver<String>, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.shared.waiters.lock().unwrap().push_back(tx);
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(command.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(rx)
    }

    /// One command, one prompt-delimited reply.
    async fn request(&self, command: &str) -> Result<String, DriverError> {
        let _permit = self.flight.clone().lock_owned().await;
        let rx = self.write_command(command).await?;
        rx.await.map_err(|_| DriverError::Terminated)
    }

    /// Dispatch a run command. The reply (and the flight lock) resolve at
    /// the next stop.
    pub async fn start_run(&self, kind: RunKind) -> Result<RunHandle, DriverError> {
        let permit = self.flight.clone().lock_owned().await;
        if kind.announces_continued() {
            let _ = self.shared.events.send(DebugEvent::Continued);
        }
        *self.shared.pending_stop.lock().unwrap() = Some(kind.stop_reason());
        let rx = self.write_command(kind.command()).await?;
        Ok(RunHandle {
            rx,
            _permit: permit,
        })
    }

    /// `$| = 1;` so the program's stdout is line-visible while debugging.
    pub async fn auto_flush_stdout(&self) -> Result<String, DriverError> {
        self.request("$| = 1;").await
    }

    pub async fn set_tty(&self, path: &str) -> Result<String, DriverError> {
        self.request(&format!("o TTY={path}")).await
    }

    /// Raw `T` reply; see [`crate::parse::parse_stack_trace`].
    pub async fn trace(&self) -> Result<String, DriverError> {
        self.request("T").await
    }

    /// Reply is returned verbatim; callers probe it for `not breakable`.
    pub async fn set_breakpoint(
        &self,
        file: &str,
        line: u32,
        condition: Option<&str>,
    ) -> Result<String, DriverError> {
        self.request(&breakpoint_command(file, line, condition)).await
    }

    pub async fn delete_breakpoints(&self, lines: &[u32]) -> Result<(), DriverError> {
        for line in lines {
            self.request(&format!("B {line}")).await?;
        }
        Ok(())
    }

    pub async fn local_variables(&self) -> Result<String, DriverError> {
        self.request("y").await
    }

    pub async fn global_variables(&self) -> Result<String, DriverError> {
        self.request("V").await
    }

    /// `x expr`, auto-dereferencing hashes (`%h` becomes `\%h`).
    pub async fn evaluate(&self, expr: &str) -> Result<String, DriverError> {
        self.request(&evaluate_command(expr)).await
    }

    /// Interrupt the debuggee: SIGINT to the process group, falling back to
    /// the direct child when group signalling fails.
    pub fn pause(&self) {
        self.shared.pause_pending.store(true, Ordering::SeqCst);
        #[cfg(unix)]
        {
            let pid = self.pid as i32;
            let rc = unsafe { libc::kill(-pid, libc::SIGINT) };
            if rc != 0 {
                warn!(pid, "process-group SIGINT failed, signalling child directly");
                unsafe { libc::kill(pid, libc::SIGINT) };
            }
        }
    }

    /// Tear the child down; `Terminated` is emitted once it exits.
    pub fn kill(&self) {
        self.kill_notify.notify_one();
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

fn deliver_prompt(shared: &Shared, reply: String) {
    let waiter = shared.waiters.lock().unwrap().pop_front();
    if let Some(tx) = waiter {
        let _ = tx.send(reply);
    }
    if shared.pause_pending.swap(false, Ordering::SeqCst) {
        shared.pending_stop.lock().unwrap().take();
        let _ = shared.events.send(DebugEvent::Paused);
    } else if let Some(reason) = shared.pending_stop.lock().unwrap().take() {
        let _ = shared.events.send(DebugEvent::Stopped { reason });
    }
}

fn breakpoint_command(file: &str, line: u32, condition: Option<&str>) -> String {
    match condition {
        Some(cond) => format!("b {file}:{line} {cond}"),
        None => format!("b {file}:{line}"),
    }
}

fn evaluate_command(expr: &str) -> String {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix('%') {
        format!("x \\%{rest}")
    } else {
        format!("x {expr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_command_with_and_without_condition() {
        assert_eq!(breakpoint_command("script.pl", 10, None), "b script.pl:10");
        assert_eq!(
            breakpoint_command("script.pl", 10, Some("$x > 3")),
            "b script.pl:10 $x > 3"
        );
    }

    #[test]
    fn evaluate_dereferences_hashes() {
        assert_eq!(evaluate_command("%h"), "x \\%h");
        assert_eq!(evaluate_command("@xs"), "x @xs");
        assert_eq!(evaluate_command("$x + 1"), "x $x + 1");
    }

    #[test]
    fn run_kinds_map_to_debugger_commands() {
        assert_eq!(RunKind::Continue.command(), "c");
        assert_eq!(RunKind::Next.command(), "n");
        assert_eq!(RunKind::StepInto.command(), "s");
        assert_eq!(RunKind::StepOut.command(), "o");
        assert_eq!(RunKind::Restart.command(), "R");
    }

    #[test]
    fn only_continue_and_restart_announce_continued() {
        assert!(RunKind::Continue.announces_continued());
        assert!(RunKind::Restart.announces_continued());
        assert!(!RunKind::Next.announces_continued());
        assert!(!RunKind::StepOut.announces_continued());
    }

    #[test]
    fn stop_reasons_follow_the_resuming_command() {
        assert_eq!(RunKind::Continue.stop_reason(), StopReason::Breakpoint);
        assert_eq!(RunKind::Next.stop_reason(), StopReason::Step);
        assert_eq!(RunKind::Restart.stop_reason(), StopReason::Entry);
    }

    fn test_shared() -> (Arc<Shared>, mpsc::UnboundedReceiver<DebugEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Shared {
                waiters: std::sync::Mutex::new(VecDeque::new()),
                pending_stop: std::sync::Mutex::new(None),
                pause_pending: AtomicBool::new(false),
                events: tx,
            }),
            rx,
        )
    }

    #[test]
    fn prompts_resolve_waiters_in_fifo_order() {
        let (shared, _rx) = test_shared();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        shared.waiters.lock().unwrap().push_back(tx1);
        shared.waiters.lock().unwrap().push_back(tx2);

        deliver_prompt(&shared, "first\n  DB<1> ".to_string());
        assert_eq!(rx1.try_recv().unwrap(), "first\n  DB<1> ");
        assert!(rx2.try_recv().is_err());

        deliver_prompt(&shared, "second\n  DB<2> ".to_string());
        assert_eq!(rx2.try_recv().unwrap(), "second\n  DB<2> ");
    }

    #[test]
    fn prompt_after_run_command_emits_stopped() {
        let (shared, mut rx) = test_shared();
        *shared.pending_stop.lock().unwrap() = Some(StopReason::Breakpoint);
        deliver_prompt(&shared, "  DB<3> ".to_string());
        assert_eq!(
            rx.try_recv().unwrap(),
            DebugEvent::Stopped {
                reason: StopReason::Breakpoint
            }
        );
    }

    #[test]
    fn pause_wins_over_pending_stop() {
        let (shared, mut rx) = test_shared();
        *shared.pending_stop.lock().unwrap() = Some(StopReason::Breakpoint);
        shared.pause_pending.store(true, Ordering::SeqCst);
        deliver_prompt(&shared, "  DB<4> ".to_string());
        assert_eq!(rx.try_recv().unwrap(), DebugEvent::Paused);
    }

    #[test]
    fn plain_prompt_emits_nothing() {
        let (shared, mut rx) = test_shared();
        deliver_prompt(&shared, "  DB<5> ".to_string());
        assert!(rx.try_recv().is_err());
    }
}
