//! The step kinds a builder can be configured with.

pub mod filesystem;
pub mod properties;
pub mod shell;

pub use filesystem::{DirectoryOp, DirectoryStep};
pub use properties::{SetPropertiesFromEnvStep, SetPropertyStep};
pub use shell::{ShellCommand, ShellStep};
