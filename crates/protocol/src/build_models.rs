//! Build state models.
//!
//! This module defines the structures for tracking builds, their results
//! and the source stamps they were started from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;
use uuid::Uuid;

use crate::property_models::PropertyEntry;

/// Result of a step or of a whole build.
///
/// Ordered from best to worst for the purpose of merging step results.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Warnings,
    Failure,
    Skipped,
    Exception,
    Retry,
}

impl BuildResult {
    /// Human-readable summary words used in build text.
    pub fn describe(self) -> &'static str {
        match self {
            BuildResult::Success => "successful",
            BuildResult::Warnings => "warnings",
            BuildResult::Failure => "failed",
            BuildResult::Skipped => "skipped",
            BuildResult::Exception => "exception",
            BuildResult::Retry => "retry",
        }
    }
}

/// Lifecycle status of a build.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Created but not yet started.
    Pending,

    /// Steps are executing.
    Running,

    /// All steps finished (or the build halted).
    Finished,

    /// The build was stopped by request.
    Stopped,
}

/// Which output channel a log chunk came from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
    Header,
}

/// Revision metadata for one codebase checked out by a build.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
pub struct SourceStamp {
    /// Codebase name; empty for single-codebase builders.
    #[serde(default)]
    pub codebase: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub revision: Option<String>,

    #[serde(default)]
    pub project: String,
}

impl SourceStamp {
    /// The stamp's attributes as a plain mapping, as seen by `src:`
    /// interpolation.
    pub fn as_dict(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("codebase".into(), Value::String(self.codebase.clone()));
        map.insert("repository".into(), Value::String(self.repository.clone()));
        map.insert(
            "branch".into(),
            self.branch.clone().map_or(Value::Null, Value::String),
        );
        map.insert(
            "revision".into(),
            self.revision.clone().map_or(Value::Null, Value::String),
        );
        map.insert("project".into(), Value::String(self.project.clone()));
        map
    }
}

/// The recorded state of one build.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
pub struct BuildRecord {
    #[ts(type = "string")]
    pub id: Uuid,

    pub builder_name: String,

    /// Per-builder sequence number.
    pub number: u64,

    pub status: BuildStatus,

    /// Merged result of the steps executed so far.
    pub result: BuildResult,

    /// Zero-based index of the step currently executing.
    pub current_step: usize,

    /// Per-step results, in execution order.
    pub step_results: Vec<(String, BuildResult)>,

    /// Summary words, e.g. `["build", "successful"]`.
    pub text: Vec<String>,

    /// Accumulated log lines.
    pub logs: Vec<String>,

    /// Final property snapshot.
    pub properties: Vec<PropertyEntry>,

    #[ts(type = "string")]
    pub started_at: DateTime<Utc>,

    #[ts(type = "string | null")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildRecord {
    /// Properties to seed a rebuild with: every entry not flagged runtime.
    pub fn rebuild_properties(&self) -> Vec<PropertyEntry> {
        self.properties
            .iter()
            .filter(|entry| !entry.runtime)
            .cloned()
            .collect()
    }
}
