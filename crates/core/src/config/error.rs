//! Error types for configuration loading.
//!
//! Two kinds of errors live here:
//! - [`ConfigError`]: a file could not be read or parsed; loading stops.
//! - [`ConfigErrors`]: problems found while compiling the parsed files
//!   (malformed placeholders, conflicting arguments). These are collected
//!   through an [`ErrorReporter`] so one pass reports all of them.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk.
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML file at {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse YAML file at {path}: {source}")]
    YamlParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// Failed to walk directory structure.
    #[error("Failed to traverse directory {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// Invalid configuration structure or missing required fields.
    #[error("Invalid configuration in {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },

    /// The compiled configuration has errors.
    #[error(transparent)]
    Compile(#[from] ConfigErrors),
}

/// Type alias for Result with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Sink for configuration errors found while compiling values.
pub trait ErrorReporter {
    fn error(&mut self, message: String);
}

/// Collected configuration errors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigErrors {
    errors: Vec<String>,
}

impl ConfigErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `Ok(value)` if nothing was reported, otherwise `Err(self)`.
    pub fn into_result<T>(self, value: T) -> Result<T, ConfigErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl ErrorReporter for ConfigErrors {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "no configuration errors"),
            [only] => write!(f, "configuration error: {only}"),
            many => {
                write!(f, "{} configuration errors:", many.len())?;
                for message in many {
                    write!(f, "\n  {message}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigErrors {}

/// Reporter that prefixes every message with a location, e.g.
/// `builder 'unit' step 2`.
pub struct ScopedReporter<'a> {
    inner: &'a mut dyn ErrorReporter,
    scope: String,
}

impl<'a> ScopedReporter<'a> {
    pub fn new(inner: &'a mut dyn ErrorReporter, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }
}

impl ErrorReporter for ScopedReporter<'_> {
    fn error(&mut self, message: String) {
        self.inner.error(format!("{}: {message}", self.scope));
    }
}
