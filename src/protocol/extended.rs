use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_EXTENDED`. The request-specific data runs
/// to the end of the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extended {
    pub id: u32,
    pub request: String,
    pub data: Bytes,
}

impl_request_id!(Extended);

impl Payload for Extended {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.request);
        bytes.put_slice(&self.data);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            request: bytes.try_read_string()?,
            data: bytes.copy_to_bytes(bytes.remaining()),
        })
    }
}
