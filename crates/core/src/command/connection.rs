//! Master-side handle for one agent connection.
//!
//! [`AgentLink`] owns the transport. A background task reads agent
//! messages and routes them to the command they belong to; when the
//! connection ends every open command receives [`CommandSignal::Lost`].

use async_trait::async_trait;
use br_protocol::command_models::{CommandUpdate, RemoteCommandSpec};
use br_protocol::ipc::{AgentMessage, CommandId, MasterMessage};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{CommandError, CommandResult};
use super::transport::{MasterTransport, MessageSink, MessageSource};

/// What a running command hears from its agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSignal {
    /// A status update, in the order the agent produced it.
    Update(CommandUpdate),

    /// The agent finished the command, with failure text if it failed.
    Complete(Option<String>),

    /// The connection to the agent is gone.
    Lost(String),
}

/// Receiver for one command's signals.
pub type SignalReceiver = mpsc::UnboundedReceiver<CommandSignal>;

/// The operations a remote command needs from its agent.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// The name the agent announced.
    fn agent_name(&self) -> &str;

    /// The agent's process environment.
    fn environ(&self) -> &BTreeMap<String, String>;

    /// Registers `command_id` and asks the agent to start it.
    ///
    /// Signals for the command are delivered on the returned receiver,
    /// starting with the first update the agent sends.
    async fn start_command(
        &self,
        command_id: CommandId,
        spec: RemoteCommandSpec,
    ) -> CommandResult<SignalReceiver>;

    /// Asks the agent to kill the process behind `command_id`.
    async fn interrupt_command(&self, command_id: CommandId, reason: String) -> CommandResult<()>;
}

#[derive(Default)]
struct Routes {
    open: HashMap<CommandId, mpsc::UnboundedSender<CommandSignal>>,
    lost: Option<String>,
}

impl Routes {
    fn route(&mut self, message: AgentMessage) {
        match message {
            AgentMessage::Update { command_id, update } => match self.open.get(&command_id) {
                Some(tx) => {
                    let _ = tx.send(CommandSignal::Update(update));
                }
                None => debug!(command_id = %command_id, "dropping update for unknown command"),
            },
            AgentMessage::Complete {
                command_id,
                failure,
            } => match self.open.remove(&command_id) {
                Some(tx) => {
                    let _ = tx.send(CommandSignal::Complete(failure));
                }
                None => debug!(command_id = %command_id, "completion for unknown command"),
            },
            AgentMessage::Hello { name, .. } => {
                warn!(agent = %name, "ignoring repeated hello");
            }
        }
    }

    fn lose(&mut self, reason: String) {
        for (command_id, tx) in self.open.drain() {
            debug!(command_id = %command_id, "notifying command of lost connection");
            let _ = tx.send(CommandSignal::Lost(reason.clone()));
        }
        self.lost = Some(reason);
    }
}

/// A connected agent.
pub struct AgentLink {
    name: String,
    environ: BTreeMap<String, String>,
    sink: tokio::sync::Mutex<Box<dyn MessageSink<MasterMessage>>>,
    routes: Arc<Mutex<Routes>>,
    reader: JoinHandle<()>,
}

impl AgentLink {
    /// Waits for the agent's hello and starts routing its messages.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Handshake` if the first message is not a
    /// hello, or `CommandError::ConnectionClosed` if the agent hangs up
    /// first.
    pub async fn connect(transport: MasterTransport) -> CommandResult<Self> {
        let MasterTransport { sink, mut source } = transport;

        let (name, environ) = match source.recv().await? {
            Some(AgentMessage::Hello { name, environ }) => (name, environ),
            Some(other) => {
                return Err(CommandError::Handshake(format!(
                    "expected hello, got {other:?}"
                )))
            }
            None => return Err(CommandError::ConnectionClosed),
        };
        info!(agent = %name, "agent attached");

        let routes = Arc::new(Mutex::new(Routes::default()));
        let reader = tokio::spawn(read_loop(name.clone(), source, Arc::clone(&routes)));

        Ok(Self {
            name,
            environ,
            sink: tokio::sync::Mutex::new(sink),
            routes,
            reader,
        })
    }

    /// Whether the connection has been lost.
    pub fn is_lost(&self) -> bool {
        self.routes
            .lock()
            .map(|routes| routes.lost.is_some())
            .unwrap_or(true)
    }

    fn unregister(&self, command_id: &CommandId) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.open.remove(command_id);
        }
    }
}

async fn read_loop(
    agent: String,
    mut source: Box<dyn MessageSource<AgentMessage>>,
    routes: Arc<Mutex<Routes>>,
) {
    let reason = loop {
        match source.recv().await {
            Ok(Some(message)) => match routes.lock() {
                Ok(mut routes) => routes.route(message),
                Err(_) => break "routing table poisoned".to_string(),
            },
            Ok(None) => break "agent connection closed".to_string(),
            Err(err) => break format!("agent connection failed: {err}"),
        }
    };
    warn!(agent = %agent, reason = %reason, "agent detached");
    if let Ok(mut routes) = routes.lock() {
        routes.lose(reason);
    }
}

impl Drop for AgentLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl AgentConnection for AgentLink {
    fn agent_name(&self) -> &str {
        &self.name
    }

    fn environ(&self) -> &BTreeMap<String, String> {
        &self.environ
    }

    async fn start_command(
        &self,
        command_id: CommandId,
        spec: RemoteCommandSpec,
    ) -> CommandResult<SignalReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routes = self
                .routes
                .lock()
                .map_err(|_| CommandError::ConnectionLost("routing table poisoned".to_string()))?;
            if let Some(reason) = &routes.lost {
                return Err(CommandError::ConnectionLost(reason.clone()));
            }
            if routes.open.contains_key(&command_id) {
                return Err(CommandError::DuplicateCommand(command_id));
            }
            routes.open.insert(command_id, tx);
        }

        let sent = self
            .sink
            .lock()
            .await
            .send(MasterMessage::StartCommand { command_id, spec })
            .await;
        if let Err(err) = sent {
            self.unregister(&command_id);
            return Err(err);
        }
        Ok(rx)
    }

    async fn interrupt_command(&self, command_id: CommandId, reason: String) -> CommandResult<()> {
        self.sink
            .lock()
            .await
            .send(MasterMessage::InterruptCommand { command_id, reason })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::transport::channel_pair;
    use br_protocol::command_models::MkdirArgs;
    use uuid::Uuid;

    fn mkdir() -> RemoteCommandSpec {
        RemoteCommandSpec::Mkdir(MkdirArgs {
            dir: "build".to_string(),
        })
    }

    #[tokio::test]
    async fn test_handshake_and_routing() {
        let (master, mut agent) = channel_pair(16);
        let mut environ = BTreeMap::new();
        environ.insert("PATH".to_string(), "/usr/bin".to_string());
        agent
            .sink
            .send(AgentMessage::Hello {
                name: "worker".to_string(),
                environ,
            })
            .await
            .unwrap();

        let link = AgentLink::connect(master).await.unwrap();
        assert_eq!(link.agent_name(), "worker");
        assert_eq!(link.environ()["PATH"], "/usr/bin");

        let command_id = Uuid::new_v4();
        let mut signals = link.start_command(command_id, mkdir()).await.unwrap();
        assert!(matches!(
            agent.source.recv().await.unwrap(),
            Some(MasterMessage::StartCommand { .. })
        ));

        agent
            .sink
            .send(AgentMessage::Update {
                command_id,
                update: CommandUpdate::Rc(0),
            })
            .await
            .unwrap();
        agent
            .sink
            .send(AgentMessage::Complete {
                command_id,
                failure: None,
            })
            .await
            .unwrap();

        assert_eq!(
            signals.recv().await,
            Some(CommandSignal::Update(CommandUpdate::Rc(0)))
        );
        assert_eq!(signals.recv().await, Some(CommandSignal::Complete(None)));
    }

    #[tokio::test]
    async fn test_rejects_missing_hello() {
        let (master, mut agent) = channel_pair(4);
        agent
            .sink
            .send(AgentMessage::Complete {
                command_id: Uuid::new_v4(),
                failure: None,
            })
            .await
            .unwrap();

        let err = AgentLink::connect(master).await.err().unwrap();
        assert!(matches!(err, CommandError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_lost_connection_reaches_open_commands() {
        let (master, mut agent) = channel_pair(4);
        agent
            .sink
            .send(AgentMessage::Hello {
                name: "worker".to_string(),
                environ: BTreeMap::new(),
            })
            .await
            .unwrap();
        let link = AgentLink::connect(master).await.unwrap();

        let mut signals = link.start_command(Uuid::new_v4(), mkdir()).await.unwrap();
        drop(agent);

        assert!(matches!(signals.recv().await, Some(CommandSignal::Lost(_))));
        assert!(link.is_lost());
        assert!(matches!(
            link.start_command(Uuid::new_v4(), mkdir()).await,
            Err(CommandError::ConnectionLost(_))
        ));
    }
}
