//! Configuration-reload rendezvous.
//!
//! [`LogWatcher`] follows a master or agent log file and resolves once the
//! process reports that it attached, finished reconfiguring, or failed to
//! reconfigure. A fixed timeout bounds the wait.

pub mod error;
pub mod watcher;

pub use error::{LogWatchError, LogWatchResult};
pub use watcher::{watch_lines, LogWatcher, WatchOutcome, DEFAULT_TIMEOUT};
