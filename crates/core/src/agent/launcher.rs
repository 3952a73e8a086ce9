//! Process spawning for agent-side commands.
//!
//! [`ProcessLauncher`] is the seam between command logic (which decides
//! *what* to run) and the operating system. [`SubprocessLauncher`] runs real
//! processes with tokio; tests substitute scripted launchers.

use async_trait::async_trait;
use br_protocol::command_models::CommandUpdate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::error::{AgentError, AgentResult};
use crate::command::interrupt::InterruptHandle;
use crate::command::remote::{deadline_after, sleep_until};

/// One process to run on the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,

    /// Absolute working directory.
    pub workdir: PathBuf,

    /// Variables added to the agent's environment.
    pub env: BTreeMap<String, String>,

    /// Kill the process after this long without output.
    pub timeout: Option<Duration>,

    /// Kill the process after this long regardless of output.
    pub max_time: Option<Duration>,

    pub want_stdout: bool,
    pub want_stderr: bool,
}

impl ProcessRequest {
    /// A request with both streams forwarded and no time limits.
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            workdir: workdir.into(),
            env: BTreeMap::new(),
            timeout: None,
            max_time: None,
            want_stdout: true,
            want_stderr: true,
        }
    }

    pub fn with_limits(mut self, timeout: Option<Duration>, max_time: Option<Duration>) -> Self {
        self.timeout = timeout;
        self.max_time = max_time;
        self
    }

    /// The command line as shown in log headers.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Runs processes on behalf of agent commands.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs `request` to completion and returns its exit code.
    ///
    /// Output is streamed to `updates` as it arrives. The process is killed
    /// if a time limit expires or `interrupt` fires.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Timeout` or `AgentError::Interrupted` when the
    /// process was killed, and `AgentError::Spawn` if it could not start.
    async fn run(
        &self,
        request: ProcessRequest,
        updates: &mpsc::UnboundedSender<CommandUpdate>,
        interrupt: InterruptHandle,
    ) -> AgentResult<i32>;
}

/// Launches real subprocesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessLauncher;

enum Kill {
    Timeout(String),
    Interrupt(String),
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    async fn run(
        &self,
        request: ProcessRequest,
        updates: &mpsc::UnboundedSender<CommandUpdate>,
        mut interrupt: InterruptHandle,
    ) -> AgentResult<i32> {
        let (program, args) = request.argv.split_first().ok_or(AgentError::EmptyCommand)?;

        let _ = updates.send(CommandUpdate::Header(format!(
            "{}\n in dir {}\n",
            request.display(),
            request.workdir.display()
        )));

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.current_dir(&request.workdir);
        cmd.envs(&request.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            program: program.clone(),
            source,
        })?;
        debug!(program = %program, pid = ?child.id(), "process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("failed to capture stderr"))?;

        let stdout = LinesStream::new(BufReader::new(stdout).lines())
            .map(|line| line.map(|text| CommandUpdate::Stdout(text + "\n")));
        let stderr = LinesStream::new(BufReader::new(stderr).lines())
            .map(|line| line.map(|text| CommandUpdate::Stderr(text + "\n")));
        let mut output = stdout.merge(stderr);

        let max_deadline = request.max_time.and_then(deadline_after);
        let mut silence_deadline = request.timeout.and_then(deadline_after);
        let mut output_open = true;

        let kill = loop {
            tokio::select! {
                line = output.next(), if output_open => match line {
                    Some(Ok(update)) => {
                        silence_deadline = request.timeout.and_then(deadline_after);
                        let wanted = match &update {
                            CommandUpdate::Stdout(_) => request.want_stdout,
                            CommandUpdate::Stderr(_) => request.want_stderr,
                            _ => true,
                        };
                        if wanted {
                            let _ = updates.send(update);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(program = %program, error = %err, "stopped reading process output");
                        output_open = false;
                    }
                    None => output_open = false,
                },
                status = child.wait(), if !output_open => {
                    let rc = exit_code(status?);
                    debug!(program = %program, rc, "process exited");
                    return Ok(rc);
                }
                _ = sleep_until(silence_deadline) => {
                    break Kill::Timeout(format!(
                        "command timed out: {} seconds without output",
                        request.timeout.map_or(0.0, |d| d.as_secs_f64())
                    ));
                }
                _ = sleep_until(max_deadline) => {
                    break Kill::Timeout(format!(
                        "command timed out: {} seconds elapsed",
                        request.max_time.map_or(0.0, |d| d.as_secs_f64())
                    ));
                }
                reason = interrupt.wait() => break Kill::Interrupt(reason),
            }
        };

        let message = match &kill {
            Kill::Timeout(message) => message.clone(),
            Kill::Interrupt(reason) => format!("command interrupted: {reason}"),
        };
        let _ = updates.send(CommandUpdate::Header(format!(
            "{message}, attempting to kill\n"
        )));
        if let Err(err) = child.kill().await {
            warn!(program = %program, error = %err, "failed to kill process");
        }

        Err(match kill {
            Kill::Timeout(message) => AgentError::Timeout(message),
            Kill::Interrupt(reason) => AgentError::Interrupted(reason),
        })
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::interrupt::interrupt_pair;

    fn collect(rx: &mut mpsc::UnboundedReceiver<CommandUpdate>) -> Vec<CommandUpdate> {
        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update);
        }
        seen
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_streams_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let rc = SubprocessLauncher
            .run(
                ProcessRequest::new(sh("echo out; echo err >&2; exit 3"), dir.path()),
                &tx,
                InterruptHandle::never(),
            )
            .await
            .unwrap();

        assert_eq!(rc, 3);
        let seen = collect(&mut rx);
        assert!(matches!(seen[0], CommandUpdate::Header(_)));
        assert!(seen.contains(&CommandUpdate::Stdout("out\n".to_string())));
        assert!(seen.contains(&CommandUpdate::Stderr("err\n".to_string())));
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_is_no_limit() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let request = ProcessRequest::new(sh("exit 0"), dir.path())
            .with_limits(Some(Duration::MAX), Some(Duration::MAX));

        let rc = SubprocessLauncher
            .run(request, &tx, InterruptHandle::never())
            .await
            .unwrap();

        assert_eq!(rc, 0);
    }

    #[tokio::test]
    async fn test_suppressed_stdout_is_not_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut request = ProcessRequest::new(sh("echo hidden"), dir.path());
        request.want_stdout = false;

        let rc = SubprocessLauncher
            .run(request, &tx, InterruptHandle::never())
            .await
            .unwrap();

        assert_eq!(rc, 0);
        assert!(collect(&mut rx)
            .iter()
            .all(|update| !matches!(update, CommandUpdate::Stdout(_))));
    }

    #[tokio::test]
    async fn test_silence_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let request = ProcessRequest::new(sh("sleep 30"), dir.path())
            .with_limits(Some(Duration::from_millis(200)), None);

        let err = SubprocessLauncher
            .run(request, &tx, InterruptHandle::never())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Timeout(ref msg) if msg.contains("without output")));
    }

    #[tokio::test]
    async fn test_interrupt_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (trigger, handle) = interrupt_pair();
        trigger.fire("stop");

        let err = SubprocessLauncher
            .run(ProcessRequest::new(sh("sleep 30"), dir.path()), &tx, handle)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Interrupted(ref reason) if reason == "stop"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let request = ProcessRequest::new(vec!["nonexistent-command-xyz".to_string()], dir.path());

        let err = SubprocessLauncher
            .run(request, &tx, InterruptHandle::never())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::Spawn { ref program, .. } if program == "nonexistent-command-xyz"));
    }

    #[tokio::test]
    async fn test_empty_command() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = SubprocessLauncher
            .run(ProcessRequest::new(vec![], "."), &tx, InterruptHandle::never())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyCommand));
    }
}
