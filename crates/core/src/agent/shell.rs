//! The `shell` command.

use br_protocol::command_models::{seconds, CommandUpdate, ShellArgs};
use tracing::debug;

use super::dispatch::CommandContext;
use super::error::{AgentError, AgentResult};
use super::launcher::ProcessRequest;

/// Runs `args.command` in `basedir/workdir` and reports its exit code.
pub async fn run_shell(args: &ShellArgs, ctx: &CommandContext) -> AgentResult<()> {
    if args.command.is_empty() {
        return Err(AgentError::EmptyCommand);
    }

    let request = ProcessRequest {
        argv: args.command.clone(),
        workdir: ctx.resolve(&args.workdir),
        env: args.env.clone(),
        timeout: args.timeout.and_then(seconds),
        max_time: args.max_time.and_then(seconds),
        want_stdout: args.want_stdout,
        want_stderr: args.want_stderr,
    };

    let rc = ctx
        .launcher
        .run(request, &ctx.updates, ctx.interrupt.clone())
        .await?;
    debug!(rc, send_rc = args.send_rc, "shell command exited");

    if args.send_rc {
        ctx.send(CommandUpdate::Rc(rc));
    }
    Ok(())
}
