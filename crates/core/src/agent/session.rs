//! The agent's side of a master connection.

use br_protocol::command_models::RemoteCommandSpec;
use br_protocol::ipc::{AgentMessage, CommandId, MasterMessage};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::dispatch::{execute, CommandContext};
use super::error::AgentResult;
use super::launcher::{ProcessLauncher, SubprocessLauncher};
use crate::command::interrupt::{interrupt_pair, InterruptHandle, InterruptTrigger};
use crate::command::transport::{AgentTransport, Transport};

/// A build agent.
///
/// # Example
///
/// ```no_run
/// use br_core::agent::Agent;
/// use br_core::command::transport::tcp;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let stream = tokio::net::TcpStream::connect("127.0.0.1:9989").await?;
///     Agent::new("worker-1", "/var/lib/buildrelay").serve(tcp(stream)).await?;
///     Ok(())
/// }
/// ```
pub struct Agent {
    name: String,
    basedir: PathBuf,
    launcher: Arc<dyn ProcessLauncher>,
    environ: BTreeMap<String, String>,
}

impl Agent {
    /// An agent that runs real processes under `basedir` and announces the
    /// current process environment.
    pub fn new(name: impl Into<String>, basedir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            basedir: basedir.into(),
            launcher: Arc::new(SubprocessLauncher),
            environ: std::env::vars().collect(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Overrides the environment announced to the master.
    pub fn with_environ(mut self, environ: BTreeMap<String, String>) -> Self {
        self.environ = environ;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Serves commands until the master disconnects.
    ///
    /// Each `StartCommand` runs in its own task; its updates are forwarded
    /// in order and followed by exactly one `Complete`. When the connection
    /// ends, every running command is interrupted and awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be created or the
    /// hello cannot be sent.
    pub async fn serve(&self, transport: AgentTransport) -> AgentResult<()> {
        let Transport { mut sink, mut source } = transport;

        tokio::fs::create_dir_all(&self.basedir).await?;
        sink.send(AgentMessage::Hello {
            name: self.name.clone(),
            environ: self.environ.clone(),
        })
        .await?;
        info!(agent = %self.name, basedir = %self.basedir.display(), "connected to master");

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<AgentMessage>();
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(err) = sink.send(message).await {
                    warn!(error = %err, "failed to send to master");
                    break;
                }
            }
        });

        let mut running: HashMap<CommandId, InterruptTrigger> = HashMap::new();
        let mut tasks: JoinSet<CommandId> = JoinSet::new();

        loop {
            tokio::select! {
                message = source.recv() => match message {
                    Ok(Some(MasterMessage::StartCommand { command_id, spec })) => {
                        if running.contains_key(&command_id) {
                            warn!(command_id = %command_id, "ignoring duplicate command id");
                        } else {
                            let (trigger, handle) = interrupt_pair();
                            running.insert(command_id, trigger);
                            tasks.spawn(run_command(
                                command_id,
                                spec,
                                self.basedir.clone(),
                                Arc::clone(&self.launcher),
                                handle,
                                out_tx.clone(),
                            ));
                        }
                    }
                    Ok(Some(MasterMessage::InterruptCommand { command_id, reason })) => {
                        match running.get(&command_id) {
                            Some(trigger) => {
                                info!(command_id = %command_id, reason = %reason, "interrupting command");
                                trigger.fire(reason);
                            }
                            None => debug!(command_id = %command_id, "interrupt for finished command"),
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "master connection failed");
                        break;
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                    Ok(command_id) => {
                        running.remove(&command_id);
                    }
                    Err(err) => warn!(error = %err, "command task failed"),
                },
            }
        }

        info!(agent = %self.name, running = running.len(), "master disconnected");
        for trigger in running.values() {
            trigger.fire("master connection lost");
        }
        while tasks.join_next().await.is_some() {}

        drop(out_tx);
        let _ = writer.await;
        Ok(())
    }
}

async fn run_command(
    command_id: CommandId,
    spec: RemoteCommandSpec,
    basedir: PathBuf,
    launcher: Arc<dyn ProcessLauncher>,
    interrupt: InterruptHandle,
    out: mpsc::UnboundedSender<AgentMessage>,
) -> CommandId {
    info!(command_id = %command_id, header = spec.header(), "starting command");

    let (updates, mut updates_rx) = mpsc::unbounded_channel();
    let ctx = CommandContext {
        basedir,
        launcher,
        updates,
        interrupt,
        os: std::env::consts::OS,
    };

    let run = async move {
        let result = execute(&spec, &ctx).await;
        drop(ctx);
        result
    };
    let forward = async {
        while let Some(update) = updates_rx.recv().await {
            let _ = out.send(AgentMessage::Update { command_id, update });
        }
    };
    let (result, ()) = tokio::join!(run, forward);

    let failure = match result {
        Ok(()) => None,
        Err(err) => {
            warn!(command_id = %command_id, error = %err, "command failed");
            Some(err.to_string())
        }
    };
    info!(command_id = %command_id, failed = failure.is_some(), "command finished");
    let _ = out.send(AgentMessage::Complete {
        command_id,
        failure,
    });
    command_id
}
