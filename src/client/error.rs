use std::io;
use thiserror::Error;
use tokio::time::error::Elapsed as TimeElapsed;

use crate::{
    error::ProtocolError,
    protocol::{PacketType, Status, StatusCode},
};

pub type SftpResult<T> = Result<T, Error>;

/// Failure while bringing a session up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The channel could not be opened or broke down. Reopening it may help.
    #[error("Transport failure: {0}")]
    Transport(String),
    /// The peer does not speak a usable SFTP dialect.
    #[error("Protocol failure: {0}")]
    Protocol(String),
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Enum for client errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Contains an error status packet
    #[error("{}: {}", .0.status_code, .0.error_message)]
    Status(Status),
    /// The session is not connected (never was, or was closed)
    #[error("No connection")]
    NoConnection,
    /// The channel failed while a response was awaited
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    /// Time limit for receiving response packet exceeded
    #[error("Timeout")]
    Timeout,
    #[error("Protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Occurs when an unexpected packet is received
    #[error("Unexpected packet {0}")]
    UnexpectedPacket(PacketType),
    /// The server answered in a way the protocol does not allow
    #[error("{0}")]
    UnexpectedBehavior(String),
    /// Local file I/O
    #[error("I/O: {0}")]
    IO(String),
    /// Occurs due to exceeding the limits set by the `limits@openssh.com` extension
    #[error("Limit exceeded: {0}")]
    Limited(String),
    /// A transfer stopped after `transferred` bytes had already been
    /// applied on the remote side
    #[error("Transfer stopped after {transferred} bytes: {cause}")]
    Partial { transferred: u64, cause: Box<Error> },
    /// Some entries of a subtree operation failed
    #[error("{failed} of {total} operations failed, first: {first}")]
    Batch {
        failed: usize,
        total: usize,
        first: Box<Error>,
    },
}

impl Error {
    /// Status code of the underlying SFTP status, looking through partial
    /// and aggregate errors.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(status.status_code),
            Self::Partial { cause, .. } => cause.status_code(),
            Self::Batch { first, .. } => first.status_code(),
            _ => None,
        }
    }

    /// Whether the channel itself is unusable. Such errors are never
    /// retried by the session.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::NoConnection | Self::ConnectionLost(_) => true,
            Self::Session(error) => error.is_retryable(),
            Self::Partial { cause, .. } => cause.is_transport(),
            _ => false,
        }
    }

    pub(crate) fn is_status(&self, code: StatusCode) -> bool {
        self.status_code() == Some(code)
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::IO(error.to_string())
    }
}

impl From<TimeElapsed> for Error {
    fn from(_: TimeElapsed) -> Self {
        Self::Timeout
    }
}
