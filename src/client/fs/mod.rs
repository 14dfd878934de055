//! Types returned by the filesystem-like operations of
//! [`SftpSession`](super::SftpSession).

mod dir;

use crate::protocol::FileAttributes;

pub use dir::{Direction, ListOrder, SortKey};
pub type Metadata = FileAttributes;
