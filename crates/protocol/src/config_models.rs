//! Configuration file models.
//!
//! - `.buildrelay/master.toml`: global master settings
//! - `.buildrelay/builders/*.yaml`: builder definitions
//! - `<agent dir>/agent.toml`: agent identity and master address
//!
//! Every string inside a step may contain `%(selector:arg)s` placeholders;
//! they are parsed when the configuration is loaded, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::command_models::DEFAULT_BUILTIN_TIMEOUT;

/// Default silence timeout of shell steps, in seconds.
pub const DEFAULT_SHELL_TIMEOUT: f64 = 1200.0;

fn default_agent_name() -> String {
    "local".to_string()
}

fn default_basedir() -> String {
    ".".to_string()
}

fn default_workdir() -> String {
    "build".to_string()
}

fn default_shell_timeout() -> Option<f64> {
    Some(DEFAULT_SHELL_TIMEOUT)
}

fn default_builtin_timeout() -> Option<f64> {
    Some(DEFAULT_BUILTIN_TIMEOUT)
}

fn default_true() -> bool {
    true
}

fn default_env_source() -> String {
    "AgentEnvironment".to_string()
}

/// Global settings from `.buildrelay/master.toml`.
///
/// ```toml
/// title = "example"
/// log-file = "master.log"
///
/// [properties]
/// project = "example"
///
/// [agent]
/// name = "local"
/// basedir = "agent"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, TS)]
#[serde(rename_all = "kebab-case")]
pub struct MasterConfig {
    #[serde(default)]
    pub title: String,

    /// Log file watched by `watch-log` during reconfiguration.
    #[serde(default)]
    pub log_file: Option<String>,

    /// Global properties seeded into every build.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub properties: BTreeMap<String, Value>,

    /// Settings for the agent the master runs in-process or accepts.
    #[serde(default)]
    pub agent: LocalAgentConfig,
}

/// The `[agent]` table of `master.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(rename_all = "kebab-case")]
pub struct LocalAgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Base directory for in-process builds, relative to the master root.
    #[serde(default = "default_basedir")]
    pub basedir: String,

    /// Address to accept a remote agent on, e.g. `127.0.0.1:9989`.
    #[serde(default)]
    pub listen: Option<String>,
}

impl Default for LocalAgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            basedir: default_basedir(),
            listen: None,
        }
    }
}

/// Settings from `agent.toml` in an agent directory.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(rename_all = "kebab-case")]
pub struct AgentConfig {
    pub name: String,

    /// Master address to connect to, e.g. `127.0.0.1:9989`.
    pub master: String,

    /// Builder base directory, relative to the agent directory.
    #[serde(default = "default_basedir")]
    pub basedir: String,
}

/// A builder definition from `.buildrelay/builders/*.yaml`.
///
/// ```yaml
/// name: unit
/// properties:
///   flavor: debug
/// steps:
///   - type: rmdir
///     dir: build
///   - type: shell
///     name: compile
///     command: ["make", "FLAVOR=%(prop:flavor:-release)s"]
///     halt-on-failure: true
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(rename_all = "kebab-case")]
pub struct BuilderConfig {
    pub name: String,

    /// Builder-level properties, applied after the global ones.
    #[serde(default)]
    #[ts(type = "Record<string, unknown>")]
    pub properties: BTreeMap<String, Value>,

    pub steps: Vec<StepConfig>,
}

/// Flags shared by every step kind.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct StepCommon {
    /// Display name; defaults to the step kind.
    #[serde(default)]
    pub name: Option<String>,

    /// Stop the build after this step fails.
    #[serde(default)]
    pub halt_on_failure: bool,

    /// Mark the build failed when this step fails.
    #[serde(default = "default_true")]
    pub flunk_on_failure: bool,

    /// Mark the build as having warnings when this step fails.
    #[serde(default)]
    pub warn_on_failure: bool,

    /// Mark the build as having warnings when this step has warnings.
    #[serde(default)]
    pub warn_on_warnings: bool,

    /// Mark the build failed when this step has warnings.
    #[serde(default)]
    pub flunk_on_warnings: bool,

    /// Run even after an earlier step halted the build.
    #[serde(default)]
    pub always_run: bool,
}

/// A shell command given either as argv or as one line for `/bin/sh -c`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(untagged)]
pub enum CommandLine {
    Argv(Vec<String>),
    Line(String),
}

/// One step of a builder.
#[derive(Serialize, Deserialize, Debug, Clone, TS)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepConfig {
    /// Run a command on the agent.
    Shell {
        #[serde(flatten)]
        common: StepCommon,
        command: CommandLine,
        #[serde(default = "default_workdir")]
        workdir: String,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default = "default_shell_timeout")]
        timeout: Option<f64>,
        #[serde(default, rename = "max-time")]
        max_time: Option<f64>,
        /// Store the command's stdout in this property.
        #[serde(default)]
        property: Option<String>,
    },

    /// Create a directory on the agent.
    Mkdir {
        #[serde(flatten)]
        common: StepCommon,
        dir: String,
    },

    /// Remove a directory tree on the agent.
    Rmdir {
        #[serde(flatten)]
        common: StepCommon,
        dir: String,
        #[serde(default = "default_builtin_timeout")]
        timeout: Option<f64>,
        #[serde(default, rename = "max-time")]
        max_time: Option<f64>,
    },

    /// Copy a directory tree on the agent.
    Cpdir {
        #[serde(flatten)]
        common: StepCommon,
        fromdir: String,
        todir: String,
        #[serde(default = "default_builtin_timeout")]
        timeout: Option<f64>,
        #[serde(default, rename = "max-time")]
        max_time: Option<f64>,
    },

    /// Set a property from a (possibly interpolated) value.
    SetProperty {
        #[serde(flatten)]
        common: StepCommon,
        property: String,
        #[ts(type = "unknown")]
        value: Value,
    },

    /// Copy agent environment variables into runtime properties.
    SetPropertiesFromEnv {
        #[serde(flatten)]
        common: StepCommon,
        variables: Vec<String>,
        #[serde(default = "default_env_source")]
        source: String,
    },
}

impl StepConfig {
    /// Shared flags of this step.
    pub fn common(&self) -> &StepCommon {
        match self {
            StepConfig::Shell { common, .. }
            | StepConfig::Mkdir { common, .. }
            | StepConfig::Rmdir { common, .. }
            | StepConfig::Cpdir { common, .. }
            | StepConfig::SetProperty { common, .. }
            | StepConfig::SetPropertiesFromEnv { common, .. } => common,
        }
    }

    /// Name shown in events: the configured name or the step kind.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.common().name {
            return name.clone();
        }
        match self {
            StepConfig::Shell { .. } => "shell",
            StepConfig::Mkdir { .. } => "mkdir",
            StepConfig::Rmdir { .. } => "rmdir",
            StepConfig::Cpdir { .. } => "cpdir",
            StepConfig::SetProperty { .. } => "set-property",
            StepConfig::SetPropertiesFromEnv { .. } => "set-properties-from-env",
        }
        .to_string()
    }
}
