//! Common test utilities for integration tests.
//!
//! - Fixtures: master directories and in-process agents
//! - Assertions over build event sequences

pub mod assertions;
pub mod fixtures;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
