//! Routes a remote command spec to the handler that runs it.

use br_protocol::command_models::{CommandUpdate, RemoteCommandSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::error::{AgentError, AgentResult};
use super::launcher::ProcessLauncher;
use super::{fs, shell};
use crate::command::interrupt::InterruptHandle;

/// Everything a command handler needs while it runs.
pub struct CommandContext {
    /// Directory every relative path in a command resolves against.
    pub basedir: PathBuf,

    pub launcher: Arc<dyn ProcessLauncher>,

    /// Status updates, forwarded to the master in order.
    pub updates: mpsc::UnboundedSender<CommandUpdate>,

    pub interrupt: InterruptHandle,

    /// Operating system name as reported by `std::env::consts::OS`.
    pub os: &'static str,
}

impl CommandContext {
    pub fn send(&self, update: CommandUpdate) {
        let _ = self.updates.send(update);
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.basedir.join(relative)
    }
}

/// Runs one command to completion.
///
/// A nonzero `rc` is not an error; errors mean the command could not run
/// to completion (spawn failure, interrupt). A process killed by a timeout
/// reports `rc` -1.
pub async fn execute(spec: &RemoteCommandSpec, ctx: &CommandContext) -> AgentResult<()> {
    let result = match spec {
        RemoteCommandSpec::Shell(args) => shell::run_shell(args, ctx).await,
        RemoteCommandSpec::Mkdir(args) => fs::make_directory(args, ctx).await,
        RemoteCommandSpec::Rmdir(args) => fs::remove_directory(args, ctx).await,
        RemoteCommandSpec::Cpdir(args) => fs::copy_directory(args, ctx).await,
    };

    match result {
        Err(AgentError::Timeout(message)) => {
            debug!(header = spec.header(), reason = %message, "process killed by timeout");
            let send_rc = match spec {
                RemoteCommandSpec::Shell(args) => args.send_rc,
                _ => true,
            };
            if send_rc {
                ctx.send(CommandUpdate::Rc(-1));
            }
            Ok(())
        }
        other => other,
    }
}
