//! Tailing a process log until it reports how startup went.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use super::error::{LogWatchError, LogWatchResult};

/// How long to wait for a terminal line.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which process reported a successful start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// An agent attached to its master.
    Agent,

    /// A master finished starting or reconfiguring.
    Master,
}

impl WatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchOutcome::Agent => "agent",
            WatchOutcome::Master => "master",
        }
    }
}

/// Tails a log file until it reports a start or reconfiguration outcome.
///
/// # Example
///
/// ```no_run
/// use br_core::logwatcher::LogWatcher;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = LogWatcher::new("master/master.log")
///     .with_timeout(Duration::from_secs(30))
///     .start()
///     .await?;
/// println!("{} is running", outcome.as_str());
/// # Ok(())
/// # }
/// ```
pub struct LogWatcher {
    path: PathBuf,
    timeout: Duration,
    echo: Option<mpsc::UnboundedSender<String>>,
}

impl LogWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
            echo: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Receives every line seen while a reconfiguration is in progress.
    pub fn with_echo(mut self, echo: mpsc::UnboundedSender<String>) -> Self {
        self.echo = Some(echo);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the log file if needed, tails it from its current end and
    /// resolves with the first outcome.
    ///
    /// The tail process is killed before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `LogWatchError::Open` if the file cannot be created
    /// - `LogWatchError::Timeout` if no terminal line arrives in time
    /// - `LogWatchError::Reconfig` if the log reports a failed reconfiguration
    pub async fn start(self) -> LogWatchResult<WatchOutcome> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| LogWatchError::Open {
                path: self.path.clone(),
                source,
            })?;

        let tail = which::which("tail").map_err(|_| LogWatchError::TailNotFound)?;
        let mut child = Command::new(tail)
            .args(["-f", "-n", "0"])
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(LogWatchError::Spawn)?;
        debug!(path = %self.path.display(), pid = ?child.id(), "tailing log");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LogWatchError::Spawn(std::io::Error::other("failed to capture stdout")))?;
        let lines = LinesStream::new(BufReader::new(stdout).lines());

        let result = watch_lines(lines, self.timeout, self.echo.as_ref()).await;

        if let Err(err) = child.kill().await {
            warn!(error = %err, "failed to kill tail");
        }
        match &result {
            Ok(outcome) => info!(path = %self.path.display(), outcome = outcome.as_str(), "log reported success"),
            Err(err) => warn!(path = %self.path.display(), error = %err, "log watch failed"),
        }
        result
    }
}

/// Scans `lines` for a terminal line, giving up after `timeout`.
pub async fn watch_lines<S>(
    lines: S,
    timeout: Duration,
    echo: Option<&mpsc::UnboundedSender<String>>,
) -> LogWatchResult<WatchOutcome>
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
{
    tokio::time::timeout(timeout, scan(lines, echo))
        .await
        .map_err(|_| LogWatchError::Timeout(timeout))?
}

async fn scan<S>(
    mut lines: S,
    echo: Option<&mpsc::UnboundedSender<String>>,
) -> LogWatchResult<WatchOutcome>
where
    S: Stream<Item = std::io::Result<String>> + Unpin,
{
    let mut matcher = LineMatcher::default();
    while let Some(line) = lines.next().await {
        let line = line?;
        if matcher.in_reconfig_after(&line) {
            if let Some(echo) = echo {
                let _ = echo.send(line.clone());
            }
        }
        if let Some(result) = classify(&line) {
            return result;
        }
    }
    Err(LogWatchError::Closed)
}

#[derive(Default)]
struct LineMatcher {
    in_reconfig: bool,
}

impl LineMatcher {
    fn in_reconfig_after(&mut self, line: &str) -> bool {
        if line.contains("Log opened.") || line.contains("beginning configuration update") {
            self.in_reconfig = true;
        }
        self.in_reconfig
    }
}

fn classify(line: &str) -> Option<LogWatchResult<WatchOutcome>> {
    if line.contains("message from master: attached") {
        return Some(Ok(WatchOutcome::Agent));
    }
    if line.contains("reconfig aborted") || line.contains("reconfig partially applied") {
        return Some(Err(LogWatchError::Reconfig));
    }
    if line.contains("configuration update complete") || line.contains("BuildMaster is running") {
        return Some(Ok(WatchOutcome::Master));
    }
    None
}
