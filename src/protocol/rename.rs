use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_RENAME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub id: u32,
    pub oldpath: String,
    pub newpath: String,
    /// `SSH_FXF_RENAME_*` flags, only on the wire from v5.
    pub flags: u32,
}

impl_request_id!(Rename);

impl Payload for Rename {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.oldpath);
        bytes.put_str(&self.newpath);

        if version >= 5 {
            bytes.put_u32(self.flags);
        }
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let oldpath = bytes.try_read_string()?;
        let newpath = bytes.try_read_string()?;
        let flags = if version >= 5 && bytes.has_remaining() {
            bytes.try_read_u32()?
        } else {
            0
        };

        Ok(Self {
            id,
            oldpath,
            newpath,
            flags,
        })
    }
}
