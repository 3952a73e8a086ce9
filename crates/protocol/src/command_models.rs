//! Remote command models exchanged between the master and its agents.
//!
//! A remote command is identified on the wire by its `header` (`shell`,
//! `mkdir`, `rmdir`, `cpdir`). Arguments are always concrete values: every
//! renderable has been resolved against the build's properties before the
//! command is serialized.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use ts_rs::TS;

/// Default silence timeout applied by the filesystem built-ins, in seconds.
pub const DEFAULT_BUILTIN_TIMEOUT: f64 = 120.0;

fn default_builtin_timeout() -> Option<f64> {
    Some(DEFAULT_BUILTIN_TIMEOUT)
}

fn default_true() -> bool {
    true
}

/// A fully rendered command, ready to be sent to an agent.
///
/// Serialized as `{"header": "...", "args": {...}}`:
///
/// ```json
/// {
///   "header": "shell",
///   "args": {
///     "workdir": "build",
///     "command": ["make", "all"],
///     "env": {"CC": "clang"},
///     "want_stdout": true,
///     "want_stderr": true,
///     "send_rc": true,
///     "timeout": 1200.0,
///     "max_time": null
///   }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(tag = "header", content = "args", rename_all = "lowercase")]
pub enum RemoteCommandSpec {
    /// Run an external program on the agent.
    Shell(ShellArgs),
    /// Create a directory (and its parents) under the builder directory.
    Mkdir(MkdirArgs),
    /// Recursively and forcefully remove a directory.
    Rmdir(RmdirArgs),
    /// Recursively copy a directory tree, preserving attributes.
    Cpdir(CpdirArgs),
}

impl RemoteCommandSpec {
    /// The wire header naming this command.
    pub fn header(&self) -> &'static str {
        match self {
            RemoteCommandSpec::Shell(_) => "shell",
            RemoteCommandSpec::Mkdir(_) => "mkdir",
            RemoteCommandSpec::Rmdir(_) => "rmdir",
            RemoteCommandSpec::Cpdir(_) => "cpdir",
        }
    }

    /// Seconds of silence tolerated before the command is killed.
    pub fn silence_timeout(&self) -> Option<Duration> {
        let secs = match self {
            RemoteCommandSpec::Shell(args) => args.timeout,
            RemoteCommandSpec::Mkdir(_) => None,
            RemoteCommandSpec::Rmdir(args) => args.timeout,
            RemoteCommandSpec::Cpdir(args) => args.timeout,
        };
        secs.and_then(seconds)
    }

    /// Absolute runtime limit, measured from dispatch.
    pub fn max_time(&self) -> Option<Duration> {
        let secs = match self {
            RemoteCommandSpec::Shell(args) => args.max_time,
            RemoteCommandSpec::Mkdir(_) => None,
            RemoteCommandSpec::Rmdir(args) => args.max_time,
            RemoteCommandSpec::Cpdir(args) => args.max_time,
        };
        secs.and_then(seconds)
    }
}

/// Converts a wire timeout into a `Duration`; non-positive values disable
/// it, and so do values too large to represent.
pub fn seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

/// Arguments of the `shell` command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ShellArgs {
    /// Working directory, relative to the agent's builder base directory.
    pub workdir: String,

    /// Program and arguments. Never empty.
    pub command: Vec<String>,

    /// Environment overrides applied on top of the agent's environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Stream stdout chunks back to the master.
    #[serde(default = "default_true")]
    pub want_stdout: bool,

    /// Stream stderr chunks back to the master.
    #[serde(default = "default_true")]
    pub want_stderr: bool,

    /// Send the final `rc` update. Disabled when a composite command
    /// reports its own return code.
    #[serde(default = "default_true")]
    pub send_rc: bool,

    /// Silence timeout in seconds.
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Maximum total runtime in seconds.
    #[serde(default)]
    pub max_time: Option<f64>,
}

impl ShellArgs {
    /// A shell invocation with default flags and no timeouts.
    pub fn new(workdir: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            workdir: workdir.into(),
            command,
            env: BTreeMap::new(),
            want_stdout: true,
            want_stderr: true,
            send_rc: true,
            timeout: None,
            max_time: None,
        }
    }
}

/// Arguments of the `mkdir` command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct MkdirArgs {
    /// Directory to create, relative to the builder base directory.
    pub dir: String,
}

/// Arguments of the `rmdir` command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct RmdirArgs {
    /// Directory to remove, relative to the builder base directory.
    pub dir: String,

    #[serde(default = "default_builtin_timeout")]
    pub timeout: Option<f64>,

    #[serde(default, rename = "maxTime")]
    pub max_time: Option<f64>,
}

impl RmdirArgs {
    pub fn new(dir: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            timeout: default_builtin_timeout(),
            max_time: None,
        }
    }
}

/// Arguments of the `cpdir` command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct CpdirArgs {
    /// Source directory, relative to the builder base directory.
    pub fromdir: String,

    /// Destination directory, relative to the builder base directory.
    pub todir: String,

    #[serde(default = "default_builtin_timeout")]
    pub timeout: Option<f64>,

    #[serde(default, rename = "maxTime")]
    pub max_time: Option<f64>,
}

impl CpdirArgs {
    pub fn new(fromdir: impl Into<String>, todir: impl Into<String>) -> Self {
        Self {
            fromdir: fromdir.into(),
            todir: todir.into(),
            timeout: default_builtin_timeout(),
            max_time: None,
        }
    }
}

/// One incremental status message produced by a running command.
///
/// Updates are delivered to the master in the order the agent produced
/// them. At most one `Rc` update is sent per command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum CommandUpdate {
    /// A chunk of the process's standard output.
    Stdout(String),

    /// A chunk of the process's standard error.
    Stderr(String),

    /// Informational text from the agent itself (not the process).
    Header(String),

    /// A line for a named auxiliary log channel.
    Log { name: String, text: String },

    /// The process's return code.
    Rc(i32),
}

/// Lifecycle of a remote command as seen by the master.
///
/// `Created -> Dispatched -> Running -> {Succeeded | Failed | TimedOut} -> Finished`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandState {
    /// Built but not yet sent.
    Created,

    /// Sent to the agent; no status received yet.
    Dispatched,

    /// At least one status update has arrived.
    Running,

    /// Ran to completion. The return code may still be nonzero.
    Succeeded,

    /// Agent-side exception, interruption or lost connection.
    Failed,

    /// Silence timeout or max-time exceeded.
    TimedOut,

    /// Terminal status has been delivered to the owner.
    Finished,
}

impl CommandState {
    /// Whether the command has reached one of its terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandState::Succeeded
                | CommandState::Failed
                | CommandState::TimedOut
                | CommandState::Finished
        )
    }
}

/// The single terminal result of a remote command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandOutcome {
    /// The command completed and reported this return code.
    Succeeded { rc: i32 },

    /// The command could not complete.
    Failed { reason: String },

    /// A timer fired before completion; the agent was asked to kill it.
    TimedOut { reason: String },
}

impl CommandOutcome {
    /// The return code, when the command completed.
    pub fn rc(&self) -> Option<i32> {
        match self {
            CommandOutcome::Succeeded { rc } => Some(*rc),
            _ => None,
        }
    }

    /// Completed with return code zero.
    pub fn is_success(&self) -> bool {
        self.rc() == Some(0)
    }

    /// The state this outcome corresponds to.
    pub fn state(&self) -> CommandState {
        match self {
            CommandOutcome::Succeeded { .. } => CommandState::Succeeded,
            CommandOutcome::Failed { .. } => CommandState::Failed,
            CommandOutcome::TimedOut { .. } => CommandState::TimedOut,
        }
    }
}
