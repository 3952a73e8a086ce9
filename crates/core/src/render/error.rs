//! Error types for rendering and percent formatting.

use thiserror::Error;

/// Errors raised while parsing or applying a percent-format string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("incomplete format")]
    Incomplete,

    #[error("incomplete format key")]
    IncompleteKey,

    #[error("unsupported format character '{0}'")]
    UnsupportedCharacter(char),

    #[error("format string mixes named and positional placeholders")]
    MixedPlaceholders,

    #[error("format requires a mapping")]
    RequiresMapping,

    #[error("format requires positional arguments")]
    RequiresPositional,

    #[error("not enough arguments for format string")]
    NotEnoughArguments,

    #[error("not all arguments converted during string formatting")]
    TooManyArguments,

    #[error("no value for format key '{0}'")]
    MissingKey(String),

    #[error("%{conversion} format: a number is required, not {found}")]
    NotANumber { conversion: char, found: &'static str },
}

/// Errors raised while rendering a value against a property store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A `WithProperties` key named a property that is not set.
    #[error("property '{0}' is not set")]
    MissingProperty(String),

    /// A user-supplied renderable failed.
    #[error("renderable failed: {0}")]
    Failed(String),
}

/// Type alias for Result with RenderError.
pub type RenderResult<T> = Result<T, RenderError>;
