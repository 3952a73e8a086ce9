//! # br-core
//!
//! Build master and agent machinery for buildrelay.
//!
//! This crate provides:
//! - Build properties and the renderables resolved against them
//! - The master/agent remote command protocol, both sides
//! - Filesystem built-ins and shell execution on the agent
//! - A log watcher that waits for a process to report its startup
//! - Builders, steps and the build engine
//! - Configuration loading from `.buildrelay/` and agent directories
//!
//! ## Modules
//!
//! - [`properties`]: per-build property store
//! - [`render`]: renderables and `%(selector:arg)s` interpolation
//! - [`command`]: master-side remote commands and transports
//! - [`agent`]: the agent that executes remote commands
//! - [`logwatcher`]: log tailing for startup and reconfiguration outcomes
//! - [`build`]: builders, steps and the build engine
//! - [`state`]: build state transitions and the build manager
//! - [`config`]: configuration loading and compilation
//! - [`telemetry`]: tracing setup

pub mod agent;
pub mod build;
pub mod command;
pub mod config;
pub mod logwatcher;
pub mod properties;
pub mod render;
pub mod state;
pub mod telemetry;
