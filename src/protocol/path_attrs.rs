use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, FileAttributes, Payload};

/// Implementation for `SSH_FXP_SETSTAT` and `SSH_FXP_MKDIR`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAttrs {
    pub id: u32,
    pub path: String,
    pub attrs: FileAttributes,
}

impl_request_id!(PathAttrs);

impl Payload for PathAttrs {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.path);
        self.attrs.encode(version, bytes);
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            path: bytes.try_read_string()?,
            attrs: FileAttributes::decode(bytes, version)?,
        })
    }
}
