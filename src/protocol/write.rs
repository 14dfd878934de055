use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_WRITE`
#[derive(Clone, PartialEq, Eq)]
pub struct Write {
    pub id: u32,
    pub handle: Bytes,
    pub offset: u64,
    pub data: Bytes,
}

impl_request_id!(Write);

impl fmt::Debug for Write {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Write")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("offset", &self.offset)
            .field("data", &self.data.len())
            .finish()
    }
}

impl Payload for Write {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.handle);
        bytes.put_u64(self.offset);
        bytes.put_bytes_prefixed(&self.data);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            handle: bytes.try_read_bytes()?,
            offset: bytes.try_read_u64()?,
            data: bytes.try_read_bytes()?,
        })
    }
}
