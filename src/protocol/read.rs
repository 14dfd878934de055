use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_READ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub id: u32,
    pub handle: Bytes,
    pub offset: u64,
    pub len: u32,
}

impl_request_id!(Read);

impl Payload for Read {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.handle);
        bytes.put_u64(self.offset);
        bytes.put_u32(self.len);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            handle: bytes.try_read_bytes()?,
            offset: bytes.try_read_u64()?,
            len: bytes.try_read_u32()?,
        })
    }
}
