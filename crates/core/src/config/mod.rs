//! Configuration loading and management.
//!
//! This module loads the master's `.buildrelay/` directory and agent
//! directories, and compiles builder definitions into runnable builders.

pub mod error;
pub mod loader;
pub mod models;

pub use error::{ConfigError, ConfigErrors, ConfigResult, ErrorReporter, ScopedReporter};
pub use loader::{is_agent_dir, load_agent_config, load_config};
pub use models::AppConfig;
