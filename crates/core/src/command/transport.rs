//! Ordered, bidirectional message transports between master and agent.
//!
//! Two implementations are provided:
//! - [`channel_pair`]: in-process tokio channels
//! - [`json_lines`]: newline-delimited JSON over any async byte stream
//!   (TCP in the CLI)

use async_trait::async_trait;
use br_protocol::ipc::{AgentMessage, MasterMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use super::error::{CommandError, CommandResult};

/// Sending half of a transport.
#[async_trait]
pub trait MessageSink<M>: Send {
    async fn send(&mut self, message: M) -> CommandResult<()>;
}

/// Receiving half of a transport. `Ok(None)` means the peer closed.
#[async_trait]
pub trait MessageSource<M>: Send {
    async fn recv(&mut self) -> CommandResult<Option<M>>;
}

/// Both halves of one connection.
pub struct Transport<Out, In> {
    pub sink: Box<dyn MessageSink<Out>>,
    pub source: Box<dyn MessageSource<In>>,
}

/// The master's end: sends `MasterMessage`, receives `AgentMessage`.
pub type MasterTransport = Transport<MasterMessage, AgentMessage>;

/// The agent's end: sends `AgentMessage`, receives `MasterMessage`.
pub type AgentTransport = Transport<AgentMessage, MasterMessage>;

struct ChannelSink<M>(mpsc::Sender<M>);

struct ChannelSource<M>(mpsc::Receiver<M>);

#[async_trait]
impl<M: Send + 'static> MessageSink<M> for ChannelSink<M> {
    async fn send(&mut self, message: M) -> CommandResult<()> {
        self.0
            .send(message)
            .await
            .map_err(|_| CommandError::ConnectionClosed)
    }
}

#[async_trait]
impl<M: Send + 'static> MessageSource<M> for ChannelSource<M> {
    async fn recv(&mut self) -> CommandResult<Option<M>> {
        Ok(self.0.recv().await)
    }
}

/// Connected in-process transports for a master and one agent.
pub fn channel_pair(buffer: usize) -> (MasterTransport, AgentTransport) {
    let (to_agent, from_master) = mpsc::channel(buffer);
    let (to_master, from_agent) = mpsc::channel(buffer);
    (
        Transport {
            sink: Box::new(ChannelSink(to_agent)),
            source: Box::new(ChannelSource(from_agent)),
        },
        Transport {
            sink: Box::new(ChannelSink(to_master)),
            source: Box::new(ChannelSource(from_master)),
        },
    )
}

struct JsonLinesSink<W, M> {
    writer: W,
    _message: PhantomData<fn(M)>,
}

struct JsonLinesSource<R, M> {
    lines: Lines<BufReader<R>>,
    _message: PhantomData<fn() -> M>,
}

#[async_trait]
impl<W, M> MessageSink<M> for JsonLinesSink<W, M>
where
    W: AsyncWrite + Unpin + Send,
    M: Serialize + Send + 'static,
{
    async fn send(&mut self, message: M) -> CommandResult<()> {
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<R, M> MessageSource<M> for JsonLinesSource<R, M>
where
    R: AsyncRead + Unpin + Send,
    M: DeserializeOwned + Send + 'static,
{
    async fn recv(&mut self) -> CommandResult<Option<M>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
        Ok(None)
    }
}

/// A transport writing one JSON document per line.
pub fn json_lines<R, W, Out, In>(reader: R, writer: W) -> Transport<Out, In>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    Transport {
        sink: Box::new(JsonLinesSink {
            writer,
            _message: PhantomData,
        }),
        source: Box::new(JsonLinesSource {
            lines: BufReader::new(reader).lines(),
            _message: PhantomData,
        }),
    }
}

/// JSON-lines transport over a TCP connection.
pub fn tcp<Out, In>(stream: TcpStream) -> Transport<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    let (reader, writer) = stream.into_split();
    json_lines(reader, writer)
}
