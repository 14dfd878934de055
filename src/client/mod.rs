//! Client side of the protocol.
//!
//! [`SftpSession`] is the filesystem-like entry point. It is layered on
//! [`RawSftpSession`], which speaks the protocol one request at a time,
//! over a [`Transport`] supplied by the SSH layer.

mod cache;
mod config;
pub mod error;
pub mod fs;
mod negotiator;
pub mod path;
mod pipeline;
pub mod rawsession;
mod session;
mod transport;

pub use cache::{CacheEntry, StatCache};
pub use config::{PipelineWindows, SessionConfig, MAX_TRANSFER_LEN};
pub use negotiator::{select_version, Negotiated, Negotiator, SessionState, SFTP_SERVER_COMMAND};
pub use path::PathResolver;
pub use pipeline::{Batch, BatchOutcome};
pub use rawsession::{Limits, RawSftpSession};
pub use session::{PutMode, PutOptions, PutSource, Principal, SftpSession};
pub use transport::{ChannelId, Received, StreamTransport, Transport};
