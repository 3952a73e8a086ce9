//! Error types for the log watcher.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Ways a log watch can fail.
#[derive(Error, Debug)]
pub enum LogWatchError {
    /// No terminal line appeared before the deadline.
    #[error("timed out after {}s waiting for the log to report an outcome", .0.as_secs_f64())]
    Timeout(Duration),

    /// The log reported an aborted or partially applied reconfiguration.
    #[error("reconfiguration failed; see the log for details")]
    Reconfig,

    #[error("cannot open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'tail' was not found on PATH")]
    TailNotFound,

    #[error("failed to start tail: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to read log output: {0}")]
    Read(#[from] std::io::Error),

    /// The tail process exited before an outcome was seen.
    #[error("log stream ended before an outcome was seen")]
    Closed,
}

/// Type alias for Result with LogWatchError.
pub type LogWatchResult<T> = Result<T, LogWatchError>;
