//! Build manager for coordinating concurrent builds.
//!
//! The BuildManager owns the compiled builders and one agent connection.
//! It numbers builds per builder, runs each one in its own task with its
//! own property store, and keeps every record so finished builds can be
//! inspected or rebuilt.

use crate::build::{Build, BuildRequest, Builder};
use crate::command::connection::AgentConnection;
use crate::command::interrupt::{interrupt_pair, InterruptTrigger};
use anyhow::{anyhow, Result};
use br_protocol::build_models::{BuildRecord, SourceStamp};
use br_protocol::ipc::BuildEvent;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::info;
use uuid::Uuid;

struct BuildSlot {
    /// The initial record while running, the final one afterwards.
    record: BuildRecord,
    source_stamps: Vec<SourceStamp>,
    trigger: InterruptTrigger,
    finished: watch::Receiver<Option<BuildRecord>>,
}

#[derive(Default)]
struct Registry {
    builds: HashMap<Uuid, BuildSlot>,
    last_numbers: HashMap<String, u64>,
}

/// Manages every build started against one agent.
pub struct BuildManager {
    builders: HashMap<String, Arc<Builder>>,
    global: Arc<BTreeMap<String, Value>>,
    connection: Arc<dyn AgentConnection>,
    registry: Arc<Mutex<Registry>>,
    events_tx: mpsc::Sender<BuildEvent>,
}

impl BuildManager {
    /// Create a new BuildManager.
    ///
    /// # Arguments
    ///
    /// * `builders` - Compiled builders, addressed by name
    /// * `global` - Master-wide properties seeded into every build
    /// * `connection` - The agent every build runs on
    /// * `events_tx` - Channel for build events
    pub fn new(
        builders: Vec<Builder>,
        global: BTreeMap<String, Value>,
        connection: Arc<dyn AgentConnection>,
        events_tx: mpsc::Sender<BuildEvent>,
    ) -> Self {
        Self {
            builders: builders
                .into_iter()
                .map(|builder| (builder.name.clone(), Arc::new(builder)))
                .collect(),
            global: Arc::new(global),
            connection,
            registry: Arc::new(Mutex::new(Registry::default())),
            events_tx,
        }
    }

    /// Names of the known builders, sorted.
    pub fn builder_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Start a build of `builder_name` in the background.
    ///
    /// # Returns
    ///
    /// The id of the new build; events for it are sent as it runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder is not known.
    pub async fn start_build(&self, builder_name: &str, request: BuildRequest) -> Result<Uuid> {
        let builder = self
            .builders
            .get(builder_name)
            .cloned()
            .ok_or_else(|| anyhow!("Builder {} not found", builder_name))?;

        let mut registry = self.registry.lock().await;
        let number = {
            let last = registry
                .last_numbers
                .entry(builder_name.to_string())
                .or_insert(0);
            *last += 1;
            *last
        };

        let source_stamps = request.source_stamps.clone();
        let build = Build::new(&builder, number, &self.global, request);
        let build_id = build.id();
        let (trigger, interrupt) = interrupt_pair();
        let (done_tx, finished) = watch::channel(None);
        registry.builds.insert(
            build_id,
            BuildSlot {
                record: build.record().clone(),
                source_stamps,
                trigger,
                finished,
            },
        );
        drop(registry);

        info!(build_id = %build_id, builder = %builder_name, number, "queued build");
        let connection = Arc::clone(&self.connection);
        let registry = Arc::clone(&self.registry);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let record = build
                .run(&builder, connection.as_ref(), &events_tx, interrupt)
                .await;
            if let Some(slot) = registry.lock().await.builds.get_mut(&build_id) {
                slot.record = record.clone();
            }
            let _ = done_tx.send(Some(record));
        });

        Ok(build_id)
    }

    /// Stop a running build.
    ///
    /// The running step's remote command is interrupted and no further
    /// steps start. Stopping a finished build has no effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the build is not found.
    pub async fn stop_build(&self, build_id: Uuid, reason: &str) -> Result<()> {
        let registry = self.registry.lock().await;
        let slot = registry
            .builds
            .get(&build_id)
            .ok_or_else(|| anyhow!("Build {} not found", build_id))?;
        info!(build_id = %build_id, reason, "stopping build");
        slot.trigger.fire(reason);
        Ok(())
    }

    /// Wait for a build to finish and return its final record.
    ///
    /// # Errors
    ///
    /// Returns an error if the build is not found or its task died.
    pub async fn wait(&self, build_id: Uuid) -> Result<BuildRecord> {
        let mut finished = {
            let registry = self.registry.lock().await;
            registry
                .builds
                .get(&build_id)
                .map(|slot| slot.finished.clone())
                .ok_or_else(|| anyhow!("Build {} not found", build_id))?
        };
        let record = finished
            .wait_for(Option::is_some)
            .await
            .map_err(|_| anyhow!("Build {} task ended without a result", build_id))?;
        record
            .clone()
            .ok_or_else(|| anyhow!("Build {} has no record", build_id))
    }

    /// Start a new build of the same builder with the finished build's
    /// non-runtime properties and source stamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the build is not found or still running.
    pub async fn rebuild(&self, build_id: Uuid) -> Result<Uuid> {
        let request = {
            let registry = self.registry.lock().await;
            let slot = registry
                .builds
                .get(&build_id)
                .ok_or_else(|| anyhow!("Build {} not found", build_id))?;
            if slot.record.finished_at.is_none() {
                return Err(anyhow!("Build {} is still running", build_id));
            }
            (
                slot.record.builder_name.clone(),
                BuildRequest::rebuild(&slot.record, slot.source_stamps.clone()),
            )
        };
        let (builder_name, request) = request;
        self.start_build(&builder_name, request).await
    }

    /// Get the latest known state of a build.
    pub async fn get_build(&self, build_id: Uuid) -> Option<BuildRecord> {
        let registry = self.registry.lock().await;
        registry.builds.get(&build_id).map(|slot| slot.record.clone())
    }

    /// Get every build, ordered by builder and number.
    pub async fn list_builds(&self) -> Vec<BuildRecord> {
        let registry = self.registry.lock().await;
        let mut records: Vec<BuildRecord> = registry
            .builds
            .values()
            .map(|slot| slot.record.clone())
            .collect();
        records.sort_by(|a, b| {
            a.builder_name
                .cmp(&b.builder_name)
                .then(a.number.cmp(&b.number))
        });
        records
    }

    /// Get the number of builds started so far.
    pub async fn build_count(&self) -> usize {
        let registry = self.registry.lock().await;
        registry.builds.len()
    }
}
