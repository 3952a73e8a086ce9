//! Error types for the master/agent transport.

use br_protocol::ipc::CommandId;
use thiserror::Error;

/// Errors raised by transports and agent connections.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The peer closed the connection.
    #[error("agent connection closed")]
    ConnectionClosed,

    /// The connection was lost earlier; no new commands are accepted.
    #[error("agent connection lost: {0}")]
    ConnectionLost(String),

    /// The first message from the agent was not a hello.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A command with this id is already running on the connection.
    #[error("command {0} is already running")]
    DuplicateCommand(CommandId),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Type alias for Result with CommandError.
pub type CommandResult<T> = Result<T, CommandError>;
