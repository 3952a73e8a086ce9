//! Fakes shared by the build module's unit tests.

use async_trait::async_trait;
use br_protocol::build_models::{BuildResult, SourceStamp};
use br_protocol::command_models::{CommandUpdate, RemoteCommandSpec};
use br_protocol::ipc::{BuildEvent, CommandId};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::StepResult;
use super::step::{BuildStep, StepContext};
use crate::command::connection::{AgentConnection, CommandSignal, SignalReceiver};
use crate::command::error::CommandResult;
use crate::command::interrupt::InterruptHandle;
use crate::properties::PropertyStore;

pub(crate) fn stdout(text: &str) -> CommandSignal {
    CommandSignal::Update(CommandUpdate::Stdout(text.to_string()))
}

pub(crate) fn rc(code: i32) -> CommandSignal {
    CommandSignal::Update(CommandUpdate::Rc(code))
}

/// Answers each command with the next queued script, or `rc 0`.
#[derive(Default)]
pub(crate) struct ScriptedConnection {
    environ: BTreeMap<String, String>,
    replies: Mutex<VecDeque<Vec<CommandSignal>>>,
    specs: Mutex<Vec<RemoteCommandSpec>>,
}

impl ScriptedConnection {
    pub(crate) fn with_environ(mut self, environ: BTreeMap<String, String>) -> Self {
        self.environ = environ;
        self
    }

    pub(crate) fn reply(&self, signals: Vec<CommandSignal>) {
        self.replies.lock().unwrap().push_back(signals);
    }

    pub(crate) fn specs(&self) -> Vec<RemoteCommandSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentConnection for ScriptedConnection {
    fn agent_name(&self) -> &str {
        "scripted"
    }

    fn environ(&self) -> &BTreeMap<String, String> {
        &self.environ
    }

    async fn start_command(
        &self,
        _command_id: CommandId,
        spec: RemoteCommandSpec,
    ) -> CommandResult<SignalReceiver> {
        self.specs.lock().unwrap().push(spec);
        let signals = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![rc(0)]);
        let (tx, rx) = mpsc::unbounded_channel();
        for signal in signals {
            tx.send(signal).unwrap();
        }
        Ok(rx)
    }

    async fn interrupt_command(&self, _command_id: CommandId, _reason: String) -> CommandResult<()> {
        Ok(())
    }
}

/// Owns everything a [`StepContext`] borrows.
pub(crate) struct Harness {
    pub properties: PropertyStore,
    pub stamps: Vec<SourceStamp>,
    pub connection: ScriptedConnection,
    pub logs: Vec<String>,
    pub events_tx: mpsc::Sender<BuildEvent>,
    pub events_rx: mpsc::Receiver<BuildEvent>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            properties: PropertyStore::new(),
            stamps: Vec::new(),
            connection: ScriptedConnection::default(),
            logs: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    pub(crate) async fn run(&mut self, step: &dyn BuildStep) -> StepResult<BuildResult> {
        let mut ctx = StepContext {
            build_id: Uuid::nil(),
            step_name: step.name(),
            properties: &mut self.properties,
            source_stamps: &self.stamps,
            connection: &self.connection,
            events: &self.events_tx,
            logs: &mut self.logs,
            interrupt: InterruptHandle::never(),
        };
        step.run(&mut ctx).await
    }
}
