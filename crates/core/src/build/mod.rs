//! Builders, steps and the build engine.
//!
//! A [`Builder`] is compiled once from its configuration. Each build gets a
//! fresh [`Build`] with its own property store; steps run in order against
//! one agent connection and their results are merged into the build result.

pub mod engine;
pub mod error;
pub mod factory;
pub mod step;
pub mod steps;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Build, BuildRequest, BUILD_SOURCE};
pub use error::{StepError, StepResult};
pub use factory::{compile_builder, compile_string, compile_value, Builder};
pub use step::{merge_step_result, outcome_result, BuildStep, CommandRun, StepContext, StepFlags};
