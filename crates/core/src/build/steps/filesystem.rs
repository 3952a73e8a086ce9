//! Steps wrapping the agent's filesystem built-ins.

use async_trait::async_trait;
use br_protocol::build_models::BuildResult;
use br_protocol::command_models::{
    CpdirArgs, MkdirArgs, RemoteCommandSpec, RmdirArgs, DEFAULT_BUILTIN_TIMEOUT,
};

use crate::build::error::StepResult;
use crate::build::step::{outcome_result, BuildStep, StepContext, StepFlags};
use crate::render::Renderable;

/// Which built-in to run, with its unrendered arguments.
#[derive(Debug, Clone)]
pub enum DirectoryOp {
    Make {
        dir: Renderable,
    },
    Remove {
        dir: Renderable,
    },
    Copy {
        fromdir: Renderable,
        todir: Renderable,
    },
}

impl DirectoryOp {
    fn kind(&self) -> &'static str {
        match self {
            DirectoryOp::Make { .. } => "mkdir",
            DirectoryOp::Remove { .. } => "rmdir",
            DirectoryOp::Copy { .. } => "cpdir",
        }
    }
}

/// Runs `mkdir`, `rmdir` or `cpdir` on the agent. Any nonzero `rc` fails
/// the step.
#[derive(Debug, Clone)]
pub struct DirectoryStep {
    name: String,
    flags: StepFlags,
    op: DirectoryOp,
    timeout: Option<f64>,
    max_time: Option<f64>,
}

impl DirectoryStep {
    pub fn new(name: impl Into<String>, op: DirectoryOp) -> Self {
        Self {
            name: name.into(),
            flags: StepFlags::default(),
            op,
            timeout: Some(DEFAULT_BUILTIN_TIMEOUT),
            max_time: None,
        }
    }

    pub fn mkdir(dir: impl Into<Renderable>) -> Self {
        Self::new("mkdir", DirectoryOp::Make { dir: dir.into() })
    }

    pub fn rmdir(dir: impl Into<Renderable>) -> Self {
        Self::new("rmdir", DirectoryOp::Remove { dir: dir.into() })
    }

    pub fn cpdir(fromdir: impl Into<Renderable>, todir: impl Into<Renderable>) -> Self {
        Self::new(
            "cpdir",
            DirectoryOp::Copy {
                fromdir: fromdir.into(),
                todir: todir.into(),
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_flags(mut self, flags: StepFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Limits for `rmdir` and `cpdir`; ignored by `mkdir`.
    pub fn with_limits(mut self, timeout: Option<f64>, max_time: Option<f64>) -> Self {
        self.timeout = timeout;
        self.max_time = max_time;
        self
    }

    async fn spec(&self, ctx: &StepContext<'_>) -> StepResult<RemoteCommandSpec> {
        let spec = match &self.op {
            DirectoryOp::Make { dir } => RemoteCommandSpec::Mkdir(MkdirArgs {
                dir: ctx.render_string(dir).await?,
            }),
            DirectoryOp::Remove { dir } => {
                let mut args = RmdirArgs::new(ctx.render_string(dir).await?);
                args.timeout = self.timeout;
                args.max_time = self.max_time;
                RemoteCommandSpec::Rmdir(args)
            }
            DirectoryOp::Copy { fromdir, todir } => {
                let mut args = CpdirArgs::new(
                    ctx.render_string(fromdir).await?,
                    ctx.render_string(todir).await?,
                );
                args.timeout = self.timeout;
                args.max_time = self.max_time;
                RemoteCommandSpec::Cpdir(args)
            }
        };
        Ok(spec)
    }
}

#[async_trait]
impl BuildStep for DirectoryStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> StepFlags {
        self.flags
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<BuildResult> {
        let spec = self.spec(ctx).await?;
        tracing::debug!(step = %self.name, kind = self.op.kind(), "dispatching built-in");
        let run = ctx.run_command(spec).await;
        Ok(outcome_result(&run.outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::testing::{rc, Harness};
    use crate::render::Interpolate;

    #[tokio::test]
    async fn test_rmdir_renders_directory() {
        let mut harness = Harness::new();
        harness.properties.set("buildername", "unit", "Build", false);
        let step = DirectoryStep::rmdir(Interpolate::new("%(prop:buildername)s/out").unwrap())
            .with_limits(Some(60.0), None);

        let result = harness.run(&step).await.unwrap();

        assert_eq!(result, BuildResult::Success);
        match &harness.connection.specs()[0] {
            RemoteCommandSpec::Rmdir(args) => {
                assert_eq!(args.dir, "unit/out");
                assert_eq!(args.timeout, Some(60.0));
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_rc_fails() {
        let mut harness = Harness::new();
        harness.connection.reply(vec![rc(1)]);
        let step = DirectoryStep::mkdir("build").with_name("prepare");

        let result = harness.run(&step).await.unwrap();

        assert_eq!(step.name(), "prepare");
        assert_eq!(result, BuildResult::Failure);
    }

    #[tokio::test]
    async fn test_cpdir_sends_both_paths() {
        let mut harness = Harness::new();
        let step = DirectoryStep::cpdir("build", "archive/build");

        harness.run(&step).await.unwrap();

        assert_eq!(
            harness.connection.specs(),
            vec![RemoteCommandSpec::Cpdir(CpdirArgs::new("build", "archive/build"))]
        );
    }
}
