//! The step abstraction and result merging.

use async_trait::async_trait;
use br_protocol::build_models::{BuildResult, LogStream, SourceStamp};
use br_protocol::command_models::{CommandOutcome, CommandUpdate, RemoteCommandSpec};
use br_protocol::config_models::StepCommon;
use br_protocol::ipc::BuildEvent;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::error::StepResult;
use crate::command::connection::AgentConnection;
use crate::command::interrupt::InterruptHandle;
use crate::command::remote::RemoteCommand;
use crate::properties::PropertyStore;
use crate::render::{RenderContext, RenderResult, Renderable};

/// How a step's result affects the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFlags {
    pub halt_on_failure: bool,
    pub flunk_on_failure: bool,
    pub warn_on_failure: bool,
    pub warn_on_warnings: bool,
    pub flunk_on_warnings: bool,
    pub always_run: bool,
}

impl Default for StepFlags {
    fn default() -> Self {
        Self {
            halt_on_failure: false,
            flunk_on_failure: true,
            warn_on_failure: false,
            warn_on_warnings: false,
            flunk_on_warnings: false,
            always_run: false,
        }
    }
}

impl From<&StepCommon> for StepFlags {
    fn from(common: &StepCommon) -> Self {
        Self {
            halt_on_failure: common.halt_on_failure,
            flunk_on_failure: common.flunk_on_failure,
            warn_on_failure: common.warn_on_failure,
            warn_on_warnings: common.warn_on_warnings,
            flunk_on_warnings: common.flunk_on_warnings,
            always_run: common.always_run,
        }
    }
}

/// Merges one step's result into the build result.
///
/// Returns `true` if the remaining steps should be skipped (apart from
/// those flagged `always_run`).
pub fn merge_step_result(build: &mut BuildResult, step: BuildResult, flags: &StepFlags) -> bool {
    match step {
        BuildResult::Failure => {
            if flags.warn_on_failure && *build != BuildResult::Failure {
                *build = BuildResult::Warnings;
            }
            if flags.flunk_on_failure {
                *build = BuildResult::Failure;
            }
            flags.halt_on_failure
        }
        BuildResult::Warnings => {
            if flags.warn_on_warnings && *build != BuildResult::Failure {
                *build = BuildResult::Warnings;
            }
            if flags.flunk_on_warnings {
                *build = BuildResult::Failure;
            }
            false
        }
        BuildResult::Exception | BuildResult::Retry => {
            *build = step;
            true
        }
        BuildResult::Success | BuildResult::Skipped => false,
    }
}

/// The step result implied by a remote command's outcome.
///
/// A nonzero `rc` or a timeout fails the step; a command that could not
/// complete is an exception.
pub fn outcome_result(outcome: &CommandOutcome) -> BuildResult {
    match outcome {
        CommandOutcome::Succeeded { rc: 0 } => BuildResult::Success,
        CommandOutcome::Succeeded { .. } | CommandOutcome::TimedOut { .. } => BuildResult::Failure,
        CommandOutcome::Failed { .. } => BuildResult::Exception,
    }
}

/// One unit of a builder.
#[async_trait]
pub trait BuildStep: Send + Sync {
    fn name(&self) -> &str;

    fn flags(&self) -> StepFlags;

    /// Runs the step against the build's properties and agent.
    ///
    /// # Errors
    ///
    /// Errors end the step with an `Exception` result.
    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<BuildResult>;
}

/// A finished remote command and the stdout it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRun {
    pub outcome: CommandOutcome,
    pub stdout: String,
}

/// What a running step can see and change.
pub struct StepContext<'a> {
    pub build_id: Uuid,
    pub step_name: &'a str,
    pub properties: &'a mut PropertyStore,
    pub source_stamps: &'a [SourceStamp],
    pub connection: &'a dyn AgentConnection,
    pub events: &'a mpsc::Sender<BuildEvent>,
    pub logs: &'a mut Vec<String>,
    pub interrupt: InterruptHandle,
}

impl StepContext<'_> {
    pub fn render_context(&self) -> RenderContext<'_> {
        RenderContext::new(&*self.properties, self.source_stamps)
    }

    pub async fn render(&self, renderable: &Renderable) -> RenderResult<Value> {
        let ctx = self.render_context();
        renderable.render(&ctx).await
    }

    pub async fn render_string(&self, renderable: &Renderable) -> RenderResult<String> {
        renderable.render_string(&self.render_context()).await
    }

    /// Sets a property and reports it.
    pub async fn set_property(&mut self, name: &str, value: Value, source: &str, runtime: bool) {
        debug!(build_id = %self.build_id, property = name, source, "setting property");
        self.properties.set(name, value.clone(), source, runtime);
        let _ = self
            .events
            .send(BuildEvent::PropertySet {
                build_id: self.build_id,
                name: name.to_string(),
                value,
                source: source.to_string(),
            })
            .await;
    }

    /// Dispatches `spec` to the agent, relaying its output as log chunks.
    pub async fn run_command(&mut self, spec: RemoteCommandSpec) -> CommandRun {
        let (observer, mut updates) = mpsc::unbounded_channel();
        let mut command = RemoteCommand::new(spec)
            .with_observer(observer)
            .with_interrupt(self.interrupt.clone());

        let connection = self.connection;
        let run = async move {
            let outcome = command.run(connection).await;
            drop(command);
            outcome
        };

        let build_id = self.build_id;
        let step_name = self.step_name;
        let events = self.events;
        let logs = &mut *self.logs;
        let forward = async move {
            let mut stdout = String::new();
            while let Some(update) = updates.recv().await {
                let (stream, content) = match update {
                    CommandUpdate::Stdout(text) => {
                        stdout.push_str(&text);
                        (LogStream::Stdout, text)
                    }
                    CommandUpdate::Stderr(text) => (LogStream::Stderr, text),
                    CommandUpdate::Header(text) => (LogStream::Header, text),
                    CommandUpdate::Log { name, text } => (LogStream::Header, format!("{name}: {text}")),
                    CommandUpdate::Rc(_) => continue,
                };
                logs.push(content.clone());
                let _ = events
                    .send(BuildEvent::StepLogChunk {
                        build_id,
                        step_name: step_name.to_string(),
                        stream,
                        content,
                    })
                    .await;
            }
            stdout
        };

        let (outcome, stdout) = tokio::join!(run, forward);
        CommandRun { outcome, stdout }
    }
}
