use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, FileAttributes, Payload};

/// `pflags` of `SSH_FXP_OPEN`. Up to v4 these are the
/// `SSH_FXF_*` bits below; from v5 the low three bits hold a
/// [`Disposition`] instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFlags(u32);

bitflags! {
    impl OpenFlags: u32 {
        const READ = 0x0000_0001;
        const WRITE = 0x0000_0002;
        const APPEND = 0x0000_0004;
        const CREATE = 0x0000_0008;
        const TRUNCATE = 0x0000_0010;
        const EXCLUDE = 0x0000_0020;
    }
}

/// What v5+ servers should do when the file does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    CreateNew = 0,
    CreateTruncate = 1,
    OpenExisting = 2,
    OpenOrCreate = 3,
    TruncateExisting = 4,
}

impl Disposition {
    pub fn flags(self) -> OpenFlags {
        OpenFlags::from_bits_retain(self as u32)
    }
}

/// Implementation for `SSH_FXP_OPEN`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    pub id: u32,
    pub filename: String,
    pub pflags: OpenFlags,
    /// ACE mask, only on the wire from v5.
    pub desired_access: u32,
    pub attrs: FileAttributes,
}

impl_request_id!(Open);

impl Open {
    pub const ACE4_READ_DATA: u32 = 0x0000_0001;
    pub const ACE4_WRITE_DATA: u32 = 0x0000_0002;
    pub const ACE4_APPEND_DATA: u32 = 0x0000_0004;
    pub const ACE4_READ_ATTRIBUTES: u32 = 0x0000_0080;
    pub const ACE4_WRITE_ATTRIBUTES: u32 = 0x0000_0100;
}

impl Payload for Open {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.filename);

        if version >= 5 {
            bytes.put_u32(self.desired_access);
        }

        bytes.put_u32(self.pflags.bits());
        self.attrs.encode(version, bytes);
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let filename = bytes.try_read_string()?;
        let desired_access = if version >= 5 {
            bytes.try_read_u32()?
        } else {
            0
        };

        Ok(Self {
            id,
            filename,
            pflags: OpenFlags::from_bits_retain(bytes.try_read_u32()?),
            desired_access,
            attrs: FileAttributes::decode(bytes, version)?,
        })
    }
}
