//! Filesystem built-ins: `mkdir`, `rmdir` and `cpdir`.
//!
//! Every built-in finishes by sending exactly one `rc` update. Removal and
//! copying shell out to `rm`, `chmod` and `cp` through the command's
//! [`ProcessLauncher`](super::launcher::ProcessLauncher) so they honour the
//! same timeouts and interrupts as shell commands.

use br_protocol::command_models::{seconds, CommandUpdate, CpdirArgs, MkdirArgs, RmdirArgs};
use std::path::Path;
use tracing::{debug, info, warn};

use super::dispatch::CommandContext;
use super::error::AgentResult;
use super::launcher::ProcessRequest;

/// Creates `dir` and any missing parents. An existing directory is success.
pub async fn make_directory(args: &MkdirArgs, ctx: &CommandContext) -> AgentResult<()> {
    let path = ctx.resolve(&args.dir);
    if path.is_dir() {
        ctx.send(CommandUpdate::Rc(0));
        return Ok(());
    }

    match tokio::fs::create_dir_all(&path).await {
        Ok(()) => ctx.send(CommandUpdate::Rc(0)),
        Err(err) => {
            warn!(dir = %path.display(), error = %err, "mkdir failed");
            ctx.send(CommandUpdate::Header(format!(
                "mkdir {} failed: {err}\n",
                path.display()
            )));
            ctx.send(CommandUpdate::Rc(1));
        }
    }
    Ok(())
}

/// Removes `dir` recursively.
///
/// If the first `rm -rf` fails, permissions are relaxed recursively and the
/// removal is attempted exactly once more.
pub async fn remove_directory(args: &RmdirArgs, ctx: &CommandContext) -> AgentResult<()> {
    let path = ctx.resolve(&args.dir);
    let target = path.to_string_lossy().into_owned();

    let rc = run_builtin(args.timeout, args.max_time, remove_argv(&target), ctx).await?;
    if rc == 0 {
        ctx.send(CommandUpdate::Rc(0));
        return Ok(());
    }

    info!(dir = %target, rc, "rmdir failed, relaxing permissions and retrying");
    let chmod_rc =
        run_builtin(args.timeout, args.max_time, chmod_argv(&target, ctx.os), ctx).await?;
    if chmod_rc != 0 {
        debug!(dir = %target, rc = chmod_rc, "permission relax incomplete, retrying anyway");
    }

    let rc = run_builtin(args.timeout, args.max_time, remove_argv(&target), ctx).await?;
    if rc != 0 {
        warn!(dir = %target, rc, "rmdir failed after retry");
    }
    ctx.send(CommandUpdate::Rc(rc));
    Ok(())
}

/// Copies `fromdir` to `todir`, preserving attributes and symlinks.
///
/// Missing parents of `todir` are created. An existing `todir` is copied
/// into, not replaced.
pub async fn copy_directory(args: &CpdirArgs, ctx: &CommandContext) -> AgentResult<()> {
    let from = ctx.resolve(&args.fromdir);
    let to = ctx.resolve(&args.todir);

    if let Some(parent) = to.parent().filter(|parent| !parent.is_dir()) {
        if let Err(err) = tokio::fs::create_dir_all(parent).await {
            ctx.send(CommandUpdate::Header(format!(
                "cannot create {}: {err}\n",
                parent.display()
            )));
            ctx.send(CommandUpdate::Rc(1));
            return Ok(());
        }
    }
    if to.exists() {
        warn!(todir = %to.display(), "cpdir target already exists");
        ctx.send(CommandUpdate::Header(format!(
            "cp target '{}' already exists, copying into it\n",
            to.display()
        )));
    }

    let argv = vec![
        "cp".to_string(),
        "-R".to_string(),
        "-P".to_string(),
        "-p".to_string(),
        path_arg(&from),
        path_arg(&to),
    ];
    let rc = run_builtin(args.timeout, args.max_time, argv, ctx).await?;
    ctx.send(CommandUpdate::Rc(rc));
    Ok(())
}

async fn run_builtin(
    timeout: Option<f64>,
    max_time: Option<f64>,
    argv: Vec<String>,
    ctx: &CommandContext,
) -> AgentResult<i32> {
    let request = ProcessRequest::new(argv, ctx.basedir.clone())
        .with_limits(timeout.and_then(seconds), max_time.and_then(seconds));
    ctx.launcher
        .run(request, &ctx.updates, ctx.interrupt.clone())
        .await
}

fn remove_argv(target: &str) -> Vec<String> {
    vec!["rm".to_string(), "-rf".to_string(), target.to_string()]
}

/// FreeBSD's `chmod -R` stops at the first unreadable directory.
fn chmod_argv(target: &str, os: &str) -> Vec<String> {
    if os == "freebsd" {
        ["find", target, "-exec", "chmod", "u+rwx", "{}", ";"]
            .iter()
            .map(|arg| arg.to_string())
            .collect()
    } else {
        vec![
            "chmod".to_string(),
            "-Rf".to_string(),
            "u+rwx".to_string(),
            target.to_string(),
        ]
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
