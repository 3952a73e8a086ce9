//! Error types for build steps.

use crate::render::RenderError;
use thiserror::Error;

/// Errors that end a step with an exception result.
#[derive(Error, Debug)]
pub enum StepError {
    /// A step argument failed to render.
    #[error("failed to render step arguments: {0}")]
    Render(#[from] RenderError),

    /// A rendered argument had the wrong shape.
    #[error("invalid step argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// Type alias for Result with StepError.
pub type StepResult<T> = Result<T, StepError>;
