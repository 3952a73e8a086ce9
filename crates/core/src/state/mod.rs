//! State management for builds.
//!
//! This module provides:
//! - Build record state transitions
//! - BuildManager for running and tracking concurrent builds

pub mod manager;
pub mod process;

pub use manager::BuildManager;
