use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_SYMLINK` (up to v5)
///
/// Fields are written in declaration order. OpenSSH's server reads them
/// the other way round, callers swap the values for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symlink {
    pub id: u32,
    pub linkpath: String,
    pub targetpath: String,
}

impl_request_id!(Symlink);

impl Payload for Symlink {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.linkpath);
        bytes.put_str(&self.targetpath);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            linkpath: bytes.try_read_string()?,
            targetpath: bytes.try_read_string()?,
        })
    }
}

/// Implementation for `SSH_FXP_LINK` (v6), which replaces `SYMLINK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: u32,
    pub new_link_path: String,
    pub existing_path: String,
    pub symlink: bool,
}

impl_request_id!(Link);

impl Payload for Link {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.new_link_path);
        bytes.put_str(&self.existing_path);
        bytes.put_u8(u8::from(self.symlink));
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let new_link_path = bytes.try_read_string()?;
        let existing_path = bytes.try_read_string()?;
        let symlink = bytes.has_remaining() && bytes.try_read_u8()? != 0;

        Ok(Self {
            id,
            new_link_path,
            existing_path,
            symlink,
        })
    }
}
