//! Error types for agent-side command execution.

use crate::command::CommandError;
use thiserror::Error;

/// Errors raised while an agent runs a command.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("command has no program to run")]
    EmptyCommand,

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The silence timeout or max time expired; the process was killed.
    #[error("{0}")]
    Timeout(String),

    /// The master interrupted the command; the process was killed.
    #[error("command interrupted: {0}")]
    Interrupted(String),

    #[error(transparent)]
    Transport(#[from] CommandError),
}

/// Type alias for Result with AgentError.
pub type AgentResult<T> = Result<T, AgentError>;
