//! Build record state machine.
//!
//! These functions move a [`BuildRecord`] through its lifecycle and emit
//! the matching [`BuildEvent`]s:
//!
//! `Pending -> Running -> {Finished | Stopped}`

use br_protocol::build_models::{BuildRecord, BuildResult, BuildStatus, LogStream};
use br_protocol::ipc::BuildEvent;
use br_protocol::property_models::PropertyEntry;
use chrono::Utc;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

/// Create a new BuildRecord with Pending status.
///
/// # Arguments
///
/// * `builder_name` - The builder the build runs
/// * `number` - Per-builder sequence number
pub fn create_build(builder_name: String, number: u64) -> BuildRecord {
    BuildRecord {
        id: Uuid::new_v4(),
        builder_name,
        number,
        status: BuildStatus::Pending,
        result: BuildResult::Success,
        current_step: 0,
        step_results: Vec::new(),
        text: Vec::new(),
        logs: Vec::new(),
        properties: Vec::new(),
        started_at: Utc::now(),
        finished_at: None,
    }
}

/// Transition the build to Running and emit `BuildStarted`.
pub async fn start_build(build: &mut BuildRecord, events_tx: &Sender<BuildEvent>) {
    build.status = BuildStatus::Running;
    build.started_at = Utc::now();
    let _ = events_tx
        .send(BuildEvent::BuildStarted {
            build_id: build.id,
            builder_name: build.builder_name.clone(),
            number: build.number,
        })
        .await;
}

/// Mark step `step_index` as current and emit `StepStarted`.
pub async fn start_step(
    build: &mut BuildRecord,
    events_tx: &Sender<BuildEvent>,
    step_index: usize,
    step_name: &str,
) {
    build.current_step = step_index;
    let _ = events_tx
        .send(BuildEvent::StepStarted {
            build_id: build.id,
            step_name: step_name.to_string(),
            step_index,
        })
        .await;
}

/// Record a step's result and emit `StepFinished`.
///
/// Merging the result into the build's result is up to the caller.
pub async fn finish_step(
    build: &mut BuildRecord,
    events_tx: &Sender<BuildEvent>,
    step_name: &str,
    result: BuildResult,
) {
    build.step_results.push((step_name.to_string(), result));
    let _ = events_tx
        .send(BuildEvent::StepFinished {
            build_id: build.id,
            step_name: step_name.to_string(),
            result,
        })
        .await;
}

/// Append an engine message to the build logs and emit it as a header
/// chunk of `step_name`.
pub async fn log_to_build(
    build: &mut BuildRecord,
    events_tx: &Sender<BuildEvent>,
    step_name: &str,
    message: String,
) {
    build.logs.push(message.clone());
    let _ = events_tx
        .send(BuildEvent::StepLogChunk {
            build_id: build.id,
            step_name: step_name.to_string(),
            stream: LogStream::Header,
            content: message,
        })
        .await;
}

/// Seal the build and emit `BuildFinished`.
///
/// # Arguments
///
/// * `build` - The build to finish
/// * `events_tx` - Channel to send the completion event
/// * `status` - `Finished`, or `Stopped` if the build was stopped
/// * `properties` - Final property snapshot
pub async fn finish_build(
    build: &mut BuildRecord,
    events_tx: &Sender<BuildEvent>,
    status: BuildStatus,
    properties: Vec<PropertyEntry>,
) {
    build.status = status;
    build.text = if status == BuildStatus::Stopped {
        vec!["stopped".to_string()]
    } else {
        result_text(build.result)
    };
    build.properties = properties;
    build.finished_at = Some(Utc::now());
    let _ = events_tx
        .send(BuildEvent::BuildFinished {
            build_id: build.id,
            result: build.result,
        })
        .await;
}

/// The summary words of a finished build.
pub fn result_text(result: BuildResult) -> Vec<String> {
    let words: &[&str] = match result {
        BuildResult::Failure => &["failed"],
        BuildResult::Warnings => &["warnings"],
        BuildResult::Exception => &["exception"],
        BuildResult::Retry => &["retry"],
        BuildResult::Success | BuildResult::Skipped => &["build", "successful"],
    };
    words.iter().map(|word| word.to_string()).collect()
}
