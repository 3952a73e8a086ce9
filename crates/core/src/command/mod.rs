//! Remote commands: the master dispatches work to an agent and follows its
//! progress over a message transport.

pub mod connection;
pub mod error;
pub mod interrupt;
pub mod remote;
pub mod transport;

pub use connection::{AgentConnection, AgentLink, CommandSignal, SignalReceiver};
pub use error::{CommandError, CommandResult};
pub use interrupt::{interrupt_pair, InterruptHandle, InterruptTrigger};
pub use remote::RemoteCommand;
pub use transport::{
    channel_pair, json_lines, tcp, AgentTransport, MasterTransport, MessageSink, MessageSource,
    Transport,
};
