use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, FileAttributes, Payload};

/// Implementation for `SSH_FXP_FSETSTAT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleAttrs {
    pub id: u32,
    pub handle: Bytes,
    pub attrs: FileAttributes,
}

impl_request_id!(HandleAttrs);

impl Payload for HandleAttrs {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.handle);
        self.attrs.encode(version, bytes);
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            handle: bytes.try_read_bytes()?,
            attrs: FileAttributes::decode(bytes, version)?,
        })
    }
}
