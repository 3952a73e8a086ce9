//! # br-protocol
//!
//! Wire and data models for buildrelay.
//!
//! This crate defines all shared data structures used for:
//! - Remote command dispatch between the master and its agents
//! - Status updates streamed back from running commands
//! - Build records, results and events
//! - Configuration file parsing (TOML master/agent settings, YAML builders)
//!
//! ## Modules
//!
//! - [`command_models`]: Remote command specs, status updates and outcomes
//! - [`ipc`]: Master/agent messages and build events
//! - [`build_models`]: Build records, results and source stamps
//! - [`property_models`]: Property snapshots
//! - [`config_models`]: Master, agent and builder configuration
//!
//! ## Design Principles
//!
//! - Minimal dependencies: serde, ts-rs, uuid and chrono
//! - TypeScript generation: all types derive `TS` for dashboard clients
//! - Independent compilation: no dependencies on other buildrelay crates

pub mod build_models;
pub mod command_models;
pub mod config_models;
pub mod ipc;
pub mod property_models;

// Re-export all public types for convenience
pub use build_models::*;
pub use command_models::*;
pub use config_models::*;
pub use ipc::*;
pub use property_models::*;
