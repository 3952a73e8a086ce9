//! Runs one build of a builder against one agent.

use br_protocol::build_models::{BuildRecord, BuildResult, BuildStatus, SourceStamp};
use br_protocol::ipc::BuildEvent;
use br_protocol::property_models::{PropertyEntry, PropertyValue};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc::Sender;
use tracing::{info, warn};
use uuid::Uuid;

use super::factory::Builder;
use super::step::{merge_step_result, StepContext};
use crate::command::connection::AgentConnection;
use crate::command::interrupt::InterruptHandle;
use crate::properties::{Properties, PropertyStore};
use crate::state::process::{
    create_build, finish_build, finish_step, log_to_build, start_build, start_step,
};

/// Source recorded for properties the build sets about itself.
pub const BUILD_SOURCE: &str = "Build";

/// What a build was asked for.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Properties supplied with the request, e.g. from the command line or
    /// a previous build being rebuilt.
    pub properties: Vec<PropertyEntry>,

    pub source_stamps: Vec<SourceStamp>,
}

impl BuildRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push(PropertyEntry {
            name: name.into(),
            value: value.into(),
            source: "Request".to_string(),
            runtime: false,
        });
        self
    }

    pub fn with_source_stamp(mut self, stamp: SourceStamp) -> Self {
        self.source_stamps.push(stamp);
        self
    }

    /// A request that repeats `previous` with its non-runtime properties.
    pub fn rebuild(previous: &BuildRecord, source_stamps: Vec<SourceStamp>) -> Self {
        Self {
            properties: previous.rebuild_properties(),
            source_stamps,
        }
    }
}

/// A build in progress: its record, property store and source stamps.
#[derive(Debug)]
pub struct Build {
    record: BuildRecord,
    properties: PropertyStore,
    source_stamps: Vec<SourceStamp>,
}

impl Build {
    /// Prepares build `number` of `builder`.
    ///
    /// Properties are applied in order, later sources overriding earlier
    /// ones: `global` (source `Global`), the builder's own (source
    /// `Builder`), the request's, then the build's identity and first
    /// source stamp (source `Build`).
    pub fn new(
        builder: &Builder,
        number: u64,
        global: &BTreeMap<String, Value>,
        request: BuildRequest,
    ) -> Self {
        let mut properties = PropertyStore::new();
        properties.update(global.clone(), "Global", false);
        properties.update(builder.properties.clone(), "Builder", false);
        for entry in &request.properties {
            properties.set(
                entry.name.clone(),
                entry.value.clone(),
                entry.source.clone(),
                entry.runtime,
            );
        }

        let stamp = request.source_stamps.first().cloned().unwrap_or_default();
        properties.set("buildername", builder.name.clone(), BUILD_SOURCE, false);
        properties.set("buildnumber", number, BUILD_SOURCE, false);
        properties.set("branch", stamp.branch.clone(), BUILD_SOURCE, false);
        properties.set("revision", stamp.revision.clone(), BUILD_SOURCE, false);
        properties.set("repository", stamp.repository.clone(), BUILD_SOURCE, false);
        properties.set("project", stamp.project.clone(), BUILD_SOURCE, false);

        Self {
            record: create_build(builder.name.clone(), number),
            properties,
            source_stamps: request.source_stamps,
        }
    }

    pub fn id(&self) -> Uuid {
        self.record.id
    }

    pub fn record(&self) -> &BuildRecord {
        &self.record
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub fn source_stamps(&self) -> &[SourceStamp] {
        &self.source_stamps
    }

    /// Runs every step of `builder` in order and returns the sealed record.
    ///
    /// Once a step asks to terminate the build (`halt_on_failure`, or an
    /// exception), only steps flagged `always_run` still execute. When
    /// `interrupt` fires, the running step's command is interrupted, no
    /// further step starts and the build ends `Stopped` with an
    /// `Exception` result.
    ///
    /// # Arguments
    ///
    /// * `builder` - The builder this build was created for
    /// * `connection` - The agent that runs the remote commands
    /// * `events_tx` - Channel for build events
    /// * `interrupt` - Fires when the build is stopped
    pub async fn run(
        self,
        builder: &Builder,
        connection: &dyn AgentConnection,
        events_tx: &Sender<BuildEvent>,
        interrupt: InterruptHandle,
    ) -> BuildRecord {
        let Build {
            mut record,
            mut properties,
            source_stamps,
        } = self;

        start_build(&mut record, events_tx).await;
        info!(
            build_id = %record.id,
            builder = %record.builder_name,
            number = record.number,
            agent = connection.agent_name(),
            "build started"
        );

        let mut terminate = false;
        let mut stopped = None;
        for (index, step) in builder.steps.iter().enumerate() {
            if let Some(reason) = interrupt.reason() {
                stopped = Some(reason);
                break;
            }

            let flags = step.flags();
            if terminate && !flags.always_run {
                log_to_build(
                    &mut record,
                    events_tx,
                    step.name(),
                    format!("skipping step '{}' after earlier failure\n", step.name()),
                )
                .await;
                continue;
            }

            start_step(&mut record, events_tx, index, step.name()).await;
            info!(build_id = %record.id, step = step.name(), index, "step started");

            let run = {
                let mut ctx = StepContext {
                    build_id: record.id,
                    step_name: step.name(),
                    properties: &mut properties,
                    source_stamps: &source_stamps,
                    connection,
                    events: events_tx,
                    logs: &mut record.logs,
                    interrupt: interrupt.clone(),
                };
                step.run(&mut ctx).await
            };
            let result = match run {
                Ok(result) => result,
                Err(err) => {
                    warn!(build_id = %record.id, step = step.name(), error = %err, "step raised an exception");
                    log_to_build(&mut record, events_tx, step.name(), format!("{err}\n")).await;
                    BuildResult::Exception
                }
            };

            finish_step(&mut record, events_tx, step.name(), result).await;
            info!(build_id = %record.id, step = step.name(), result = ?result, "step finished");
            if merge_step_result(&mut record.result, result, &flags) {
                terminate = true;
            }
        }

        if stopped.is_none() {
            stopped = interrupt.reason();
        }
        let status = match &stopped {
            Some(reason) => {
                warn!(build_id = %record.id, reason = %reason, "build stopped");
                record.result = BuildResult::Exception;
                BuildStatus::Stopped
            }
            None => BuildStatus::Finished,
        };

        finish_build(&mut record, events_tx, status, properties.as_list()).await;
        info!(
            build_id = %record.id,
            builder = %record.builder_name,
            result = ?record.result,
            text = %record.text.join(" "),
            "build finished"
        );
        record
    }
}

impl Properties for Build {
    fn get_property(&self, name: &str, default: Value) -> Value {
        self.properties.get_or(name, default)
    }

    fn set_property(&mut self, name: &str, value: Value, source: &str, runtime: bool) {
        self.properties.set(name, value, source, runtime);
    }

    fn has_property(&self, name: &str) -> bool {
        self.properties.has(name)
    }

    fn as_dict(&self) -> BTreeMap<String, PropertyValue> {
        self.properties.as_dict()
    }

    fn as_list(&self) -> Vec<PropertyEntry> {
        self.properties.as_list()
    }
}
