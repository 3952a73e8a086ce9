//! Agent-side command execution.
//!
//! An [`Agent`] holds one connection to the master, runs each
//! `StartCommand` it receives and streams the results back. Commands are
//! either `shell` invocations or filesystem built-ins (`mkdir`, `rmdir`,
//! `cpdir`); all of them report through the same ordered update channel
//! and finish with a single `Complete`.

pub mod dispatch;
pub mod error;
pub mod fs;
pub mod launcher;
pub mod session;
pub mod shell;

pub use dispatch::{execute, CommandContext};
pub use error::{AgentError, AgentResult};
pub use launcher::{ProcessLauncher, ProcessRequest, SubprocessLauncher};
pub use session::Agent;
