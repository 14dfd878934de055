//! Boundary to the SSH layer underneath the session.

use bytes::Bytes;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Identifies one channel of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(pub u32);

/// Outcome of a single [`Transport::receive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Some bytes, with no relation to packet boundaries.
    Data(Bytes),
    /// The peer closed the channel.
    Closed,
    /// The transport gave up waiting.
    Timeout,
}

/// An authenticated SSH connection able to carry the `sftp` subsystem.
///
/// Flow control and backpressure are the implementor's business. The
/// session only assumes ordered delivery within a channel.
#[async_trait]
pub trait Transport: Send {
    async fn open_channel(&mut self) -> io::Result<ChannelId>;

    /// Returns `false` when the server refuses the subsystem.
    async fn request_subsystem(&mut self, channel: ChannelId, name: &str) -> io::Result<bool>;

    /// Runs `command` on the channel instead of a subsystem. Returns
    /// `false` when the server refuses it.
    async fn exec(&mut self, channel: ChannelId, command: &str) -> io::Result<bool>;

    async fn send(&mut self, channel: ChannelId, data: &[u8]) -> io::Result<bool>;

    async fn receive(&mut self, channel: ChannelId) -> io::Result<Received>;

    async fn close_channel(&mut self, channel: ChannelId) -> io::Result<()>;

    /// Identification string of the SSH server, e.g. `SSH-2.0-OpenSSH_9.6`.
    fn server_identifier(&self) -> Option<&str> {
        None
    }
}

/// Adapts a byte stream that already is an `sftp` subsystem channel, such
/// as the stream of a russh channel after `request_subsystem`.
pub struct StreamTransport<S> {
    stream: S,
    server_identifier: Option<String>,
    buffer: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            server_identifier: None,
            buffer: vec![0; 32 * 1024],
        }
    }

    #[must_use]
    pub fn with_server_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.server_identifier = Some(identifier.into());
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn open_channel(&mut self) -> io::Result<ChannelId> {
        Ok(ChannelId(0))
    }

    async fn request_subsystem(&mut self, _channel: ChannelId, _name: &str) -> io::Result<bool> {
        Ok(true)
    }

    async fn exec(&mut self, _channel: ChannelId, _command: &str) -> io::Result<bool> {
        Ok(false)
    }

    async fn send(&mut self, _channel: ChannelId, data: &[u8]) -> io::Result<bool> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(true)
    }

    async fn receive(&mut self, _channel: ChannelId) -> io::Result<Received> {
        let read = self.stream.read(&mut self.buffer).await?;
        if read == 0 {
            return Ok(Received::Closed);
        }

        Ok(Received::Data(Bytes::copy_from_slice(&self.buffer[..read])))
    }

    async fn close_channel(&mut self, _channel: ChannelId) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn server_identifier(&self) -> Option<&str> {
        self.server_identifier.as_deref()
    }
}
