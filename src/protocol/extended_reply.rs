use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{buf::TryBuf, error::ProtocolError};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_EXTENDED_REPLY`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedReply {
    pub id: u32,
    pub data: Bytes,
}

impl_request_id!(ExtendedReply);

impl Payload for ExtendedReply {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_slice(&self.data);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            data: bytes.copy_to_bytes(bytes.remaining()),
        })
    }
}
