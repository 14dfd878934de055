//! Pipelined SFTP client for protocol versions 3 to 6.
//!
//! The crate does not open SSH connections itself. Anything able to carry
//! the `sftp` subsystem implements [`client::Transport`]; a stream that
//! already is such a channel can be wrapped in [`client::StreamTransport`].

#[macro_use]
extern crate log;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate async_trait;

mod buf;
/// Client side
pub mod client;
mod error;
/// Names and payloads of the extensions the client understands
pub mod extensions;
/// Protocol implementation
pub mod protocol;
mod utils;

pub use error::ProtocolError;
