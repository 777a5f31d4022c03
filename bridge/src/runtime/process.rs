//! Script runtimes backed by long-lived child processes
//!
//! A runtime reads one newline-terminated JSON command from stdin and answers
//! with one EOT-terminated frame on stdout, or on stderr when it fails.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::RuntimeCommand;
use crate::constants::{FRAME_TERMINATOR, MAX_FRAME_SIZE};
use crate::error::{Error, Result};

/// An external validator accepting one command at a time
#[async_trait]
pub trait ScriptRuntime: Send {
    /// Send `frame` and wait up to `timeout` for the response frame
    async fn execute(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Whether the runtime may serve another command
    fn is_reusable(&self) -> bool;

    /// Ask the runtime to exit, forcing it after `grace`
    async fn terminate(&mut self, grace: Duration);

    /// OS process id, when the runtime is a process
    fn pid(&self) -> Option<u32>;
}

/// Creates fresh runtimes for the pool
#[async_trait]
pub trait RuntimeFactory: Send + Sync {
    /// Start a new runtime
    async fn create(&self) -> Result<Box<dyn ScriptRuntime>>;
}

/// Spawns [`ProcessRuntime`]s from a configured command
#[derive(Debug, Clone)]
pub struct ProcessRuntimeFactory {
    command: RuntimeCommand,
}

impl ProcessRuntimeFactory {
    /// Create a factory for `command`
    pub const fn new(command: RuntimeCommand) -> Self { Self { command } }
}

#[async_trait]
impl RuntimeFactory for ProcessRuntimeFactory {
    async fn create(&self) -> Result<Box<dyn ScriptRuntime>> {
        Ok(Box::new(ProcessRuntime::spawn(&self.command)?))
    }
}

/// A child process speaking the frame protocol over stdio
pub struct ProcessRuntime {
    child:       Child,
    pid:         Option<u32>,
    stdin:       Option<ChildStdin>,
    stdout:      BufReader<ChildStdout>,
    stderr:      mpsc::UnboundedReceiver<Vec<u8>>,
    stderr_task: JoinHandle<()>,
    healthy:     bool,
}

impl ProcessRuntime {
    /// Start `command` with piped stdio
    pub fn spawn(command: &RuntimeCommand) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Report::new(Error::process_failed("spawn script runtime", None, e)))
            .attach(format!("Program: {}", command.program))?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Report::new(Error::process_failed("capture stdout", pid, "pipe missing")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Report::new(Error::process_failed("capture stderr", pid, "pipe missing")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let stderr_task = tokio::spawn(forward_stderr(stderr, sender));

        debug!(pid, program = %command.program, "Started script runtime");
        Ok(Self {
            child,
            pid,
            stdin,
            stdout: BufReader::new(stdout),
            stderr: receiver,
            stderr_task,
            healthy: true,
        })
    }

    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        let pid = self.pid;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Report::new(Error::process_failed("write command", pid, "stdin closed")))?;
        stdin
            .write_all(frame)
            .await
            .map_err(|e| Report::new(Error::process_failed("write command", pid, e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Report::new(Error::process_failed("flush command", pid, e)))
    }

    async fn receive(&mut self) -> Result<Vec<u8>> {
        let pid = self.pid;
        let mut frame = Vec::new();
        let limit = u64::try_from(MAX_FRAME_SIZE).unwrap_or(u64::MAX).saturating_add(1);
        let mut bounded = (&mut self.stdout).take(limit);

        tokio::select! {
            read = bounded.read_until(FRAME_TERMINATOR, &mut frame) => {
                let read = read.map_err(|e| Report::new(Error::process_failed("read response", pid, e)))?;
                if read == 0 {
                    return Err(Report::new(Error::process_failed("read response", pid, "runtime closed its output")));
                }
                if frame.len() > MAX_FRAME_SIZE {
                    return Err(Report::new(Error::process_failed(
                        "read response",
                        pid,
                        format!("frame exceeds {MAX_FRAME_SIZE} bytes"),
                    )));
                }
                if frame.last() == Some(&FRAME_TERMINATOR) {
                    frame.pop();
                } else {
                    // output ended without a terminator
                    self.healthy = false;
                }
            }
            Some(error) = self.stderr.recv() => {
                return Err(Report::new(Error::RuntimeProtocol(
                    String::from_utf8_lossy(&error).trim().to_string(),
                ))
                .attach(format!("PID: {pid:?}")));
            }
        }

        if let Ok(error) = self.stderr.try_recv() {
            return Err(Report::new(Error::RuntimeProtocol(
                String::from_utf8_lossy(&error).trim().to_string(),
            ))
            .attach(format!("PID: {pid:?}")));
        }
        Ok(frame)
    }
}

#[async_trait]
impl ScriptRuntime for ProcessRuntime {
    async fn execute(&mut self, frame: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if !self.healthy {
            return Err(Report::new(Error::process_failed(
                "execute command",
                self.pid,
                "runtime is no longer usable",
            )));
        }

        // output left over from a previous command means the runtime is confused
        if let Ok(stale) = self.stderr.try_recv() {
            self.healthy = false;
            return Err(Report::new(Error::RuntimeProtocol(
                String::from_utf8_lossy(&stale).trim().to_string(),
            )));
        }

        let result = tokio::time::timeout(timeout, async {
            self.send(frame).await?;
            self.receive().await
        })
        .await;

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(report)) => {
                self.healthy = false;
                Err(report)
            }
            Err(_) => {
                self.healthy = false;
                warn!(pid = self.pid, timeout_secs = timeout.as_secs_f64(), "Script runtime timed out");
                Err(Report::new(Error::process_failed(
                    "receive response",
                    self.pid,
                    format!("no response within {}s", timeout.as_secs_f64()),
                )))
            }
        }
    }

    fn is_reusable(&self) -> bool { self.healthy }

    async fn terminate(&mut self, grace: Duration) {
        self.healthy = false;
        // closing stdin lets well behaved runtimes exit on their own
        drop(self.stdin.take());

        if let Some(pid) = self.pid {
            send_terminate_signal(pid);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(pid = self.pid, %status, "Script runtime exited"),
            Ok(Err(e)) => warn!(pid = self.pid, error = %e, "Failed to wait for script runtime"),
            Err(_) => {
                debug!(pid = self.pid, "Script runtime ignored SIGTERM, killing");
                if let Err(e) = self.child.kill().await {
                    warn!(pid = self.pid, error = %e, "Failed to kill script runtime");
                }
            }
        }
        self.stderr_task.abort();
    }

    fn pid(&self) -> Option<u32> { self.pid }
}

impl Drop for ProcessRuntime {
    fn drop(&mut self) { self.stderr_task.abort(); }
}

fn send_terminate_signal(pid: u32) {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid).and_then(|process| process.kill_with(Signal::Term)) {
        Some(true) => debug!(%pid, "Sent SIGTERM to script runtime"),
        Some(false) => debug!(%pid, "SIGTERM delivery failed"),
        None => debug!(%pid, "SIGTERM unsupported or process already gone"),
    }
}

/// Forward every EOT-terminated stderr frame; a trailing unterminated chunk is forwarded on EOF
async fn forward_stderr(stderr: ChildStderr, sender: mpsc::UnboundedSender<Vec<u8>>) {
    let mut reader = BufReader::new(stderr);
    loop {
        let mut chunk = Vec::new();
        match reader.read_until(FRAME_TERMINATOR, &mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                if chunk.last() == Some(&FRAME_TERMINATOR) {
                    chunk.pop();
                }
                if chunk.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if sender.send(chunk).is_err() {
                    return;
                }
            }
        }
    }
}
