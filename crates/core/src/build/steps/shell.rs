use async_trait::async_trait;
use br_protocol::build_models::BuildResult;
use br_protocol::command_models::{RemoteCommandSpec, ShellArgs};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

use crate::build::error::{StepError, StepResult};
use crate::build::step::{outcome_result, BuildStep, StepContext, StepFlags};
use crate::render::{to_display_string, Renderable};

/// How the command line is given.
#[derive(Debug, Clone)]
pub enum ShellCommand {
    /// Rendered to a list of arguments and executed directly.
    Argv(Renderable),

    /// Rendered to one string and run with `/bin/sh -c`.
    Line(Renderable),
}

/// Runs a command on the agent, optionally storing its output in a
/// property.
#[derive(Debug, Clone)]
pub struct ShellStep {
    name: String,
    flags: StepFlags,
    command: ShellCommand,
    workdir: Renderable,
    env: Vec<(String, Renderable)>,
    timeout: Option<f64>,
    max_time: Option<f64>,
    property: Option<String>,
}

impl ShellStep {
    pub fn new(name: impl Into<String>, command: ShellCommand) -> Self {
        Self {
            name: name.into(),
            flags: StepFlags::default(),
            command,
            workdir: Renderable::from("build"),
            env: Vec::new(),
            timeout: None,
            max_time: None,
            property: None,
        }
    }

    pub fn with_flags(mut self, flags: StepFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<Renderable>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<Renderable>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn with_limits(mut self, timeout: Option<f64>, max_time: Option<f64>) -> Self {
        self.timeout = timeout;
        self.max_time = max_time;
        self
    }

    /// Stores the stripped stdout of a successful run in `property`.
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    async fn render_argv(&self, ctx: &StepContext<'_>) -> StepResult<Vec<String>> {
        match &self.command {
            ShellCommand::Line(line) => {
                let line = ctx.render_string(line).await?;
                Ok(vec!["/bin/sh".to_string(), "-c".to_string(), line])
            }
            ShellCommand::Argv(argv) => match ctx.render(argv).await? {
                Value::Array(items) => Ok(items.iter().map(to_display_string).collect()),
                other => Ok(vec![to_display_string(&other)]),
            },
        }
    }
}

#[async_trait]
impl BuildStep for ShellStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> StepFlags {
        self.flags
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<BuildResult> {
        let argv = self.render_argv(ctx).await?;
        if argv.is_empty() {
            return Err(StepError::InvalidArgument {
                name: "command".to_string(),
                reason: "rendered to an empty argument list".to_string(),
            });
        }

        let workdir = ctx.render_string(&self.workdir).await?;
        let mut env = BTreeMap::new();
        for (name, value) in &self.env {
            env.insert(name.clone(), ctx.render_string(value).await?);
        }

        let mut args = ShellArgs::new(workdir, argv);
        args.env = env;
        args.timeout = self.timeout;
        args.max_time = self.max_time;

        let run = ctx.run_command(RemoteCommandSpec::Shell(args)).await;
        let result = outcome_result(&run.outcome);
        info!(step = %self.name, outcome = ?run.outcome, "shell step finished");

        if let (Some(property), BuildResult::Success) = (&self.property, result) {
            let value = Value::String(run.stdout.trim().to_string());
            ctx.set_property(property, value, &self.name, true).await;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{rc, stdout, Harness};
    use crate::render::Interpolate;

    #[tokio::test]
    async fn test_renders_arguments_before_dispatch() {
        let mut harness = Harness::new();
        harness.properties.set("branch", "main", "test", false);
        let step = ShellStep::new(
            "checkout",
            ShellCommand::Argv(Renderable::from(vec![
                Renderable::from("git"),
                Renderable::from("checkout"),
                Interpolate::new("%(prop:branch:-trunk)s").unwrap().into(),
            ])),
        )
        .with_env("BRANCH", Interpolate::new("%(prop:branch)s").unwrap());

        let result = harness.run(&step).await.unwrap();

        assert_eq!(result, BuildResult::Success);
        match &harness.connection.specs()[0] {
            RemoteCommandSpec::Shell(args) => {
                assert_eq!(args.command, vec!["git", "checkout", "main"]);
                assert_eq!(args.workdir, "build");
                assert_eq!(args.env["BRANCH"], "main");
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_line_runs_through_sh() {
        let mut harness = Harness::new();
        let step = ShellStep::new("make", ShellCommand::Line(Renderable::from("make all")));

        harness.run(&step).await.unwrap();

        match &harness.connection.specs()[0] {
            RemoteCommandSpec::Shell(args) => {
                assert_eq!(args.command, vec!["/bin/sh", "-c", "make all"]);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stores_stripped_stdout_in_runtime_property() {
        let mut harness = Harness::new();
        harness.connection.reply(vec![stdout("  4f2a9c1\n"), rc(0)]);
        let step = ShellStep::new(
            "get-revision",
            ShellCommand::Line(Renderable::from("git rev-parse HEAD")),
        )
        .with_property("got_revision");

        harness.run(&step).await.unwrap();

        assert_eq!(
            harness.properties.get("got_revision"),
            Some(&Value::from("4f2a9c1"))
        );
        assert_eq!(harness.properties.source_of("got_revision").unwrap(), "get-revision");
        assert!(harness.properties.is_runtime("got_revision"));
        assert_eq!(harness.logs, vec!["  4f2a9c1\n"]);
    }

    #[tokio::test]
    async fn test_nonzero_rc_fails_without_setting_property() {
        let mut harness = Harness::new();
        harness.connection.reply(vec![stdout("oops\n"), rc(2)]);
        let step = ShellStep::new("probe", ShellCommand::Line(Renderable::from("false")))
            .with_property("probe");

        let result = harness.run(&step).await.unwrap();

        assert_eq!(result, BuildResult::Failure);
        assert!(!harness.properties.has("probe"));
    }

    #[tokio::test]
    async fn test_render_failure_is_an_error() {
        let mut harness = Harness::new();
        let step = ShellStep::new(
            "broken",
            ShellCommand::Line(Renderable::from_fn(|_| {
                Err(crate::render::render_failure("callable raised"))
            })),
        );

        let err = harness.run(&step).await.unwrap_err();
        assert!(matches!(err, StepError::Render(_)));
        assert!(harness.connection.specs().is_empty());
    }
}
