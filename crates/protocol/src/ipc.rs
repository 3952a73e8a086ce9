//! Messages exchanged between the master and its agents, and the build
//! events the master publishes to observers.
//!
//! The master/agent protocol follows a command/status pattern over one
//! ordered, bidirectional channel per agent connection:
//! - `MasterMessage`: requests sent from the master to an agent
//! - `AgentMessage`: handshake, status updates and completions sent back
//!
//! All enums use adjacently tagged serialization:
//! ```json
//! {
//!   "type": "startCommand",
//!   "payload": {
//!     "command_id": "8c1e…",
//!     "spec": { "header": "mkdir", "args": { "dir": "build" } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;
use uuid::Uuid;

use crate::build_models::{BuildResult, LogStream};
use crate::command_models::{CommandUpdate, RemoteCommandSpec};

/// Identifies one remote command on one agent connection.
pub type CommandId = Uuid;

/// Messages sent from the master to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum MasterMessage {
    /// Start executing a command.
    StartCommand {
        #[ts(type = "string")]
        command_id: CommandId,
        spec: RemoteCommandSpec,
    },

    /// Kill the process behind a running command.
    InterruptCommand {
        #[ts(type = "string")]
        command_id: CommandId,
        reason: String,
    },
}

/// Messages sent from an agent to the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum AgentMessage {
    /// First message on every connection.
    Hello {
        name: String,
        /// The agent's process environment, used by
        /// `set-properties-from-env` steps.
        environ: BTreeMap<String, String>,
    },

    /// An incremental status update for a running command.
    Update {
        #[ts(type = "string")]
        command_id: CommandId,
        update: CommandUpdate,
    },

    /// The command has finished on the agent. Always the last message
    /// for a given command id.
    Complete {
        #[ts(type = "string")]
        command_id: CommandId,
        /// Why the command failed, if it did.
        failure: Option<String>,
    },
}

/// Events emitted by the build engine while a build runs.
///
/// Uses tagged enum serialization:
/// ```json
/// {
///   "type": "stepFinished",
///   "payload": {
///     "build_id": "uuid-here",
///     "step_name": "compile",
///     "result": "SUCCESS"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum BuildEvent {
    /// A new build has been started.
    BuildStarted {
        #[ts(type = "string")]
        build_id: Uuid,
        builder_name: String,
        number: u64,
    },

    /// A step began executing.
    StepStarted {
        #[ts(type = "string")]
        build_id: Uuid,
        step_name: String,
        step_index: usize,
    },

    /// Output produced by the current step.
    StepLogChunk {
        #[ts(type = "string")]
        build_id: Uuid,
        step_name: String,
        stream: LogStream,
        content: String,
    },

    /// A step set a property.
    PropertySet {
        #[ts(type = "string")]
        build_id: Uuid,
        name: String,
        #[ts(type = "unknown")]
        value: serde_json::Value,
        source: String,
    },

    /// A step finished.
    StepFinished {
        #[ts(type = "string")]
        build_id: Uuid,
        step_name: String,
        result: BuildResult,
    },

    /// The build finished.
    BuildFinished {
        #[ts(type = "string")]
        build_id: Uuid,
        result: BuildResult,
    },
}
