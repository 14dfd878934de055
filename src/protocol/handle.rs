use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_HANDLE`, and the body of `SSH_FXP_CLOSE` and
/// `SSH_FXP_READDIR`. The handle is an opaque byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub id: u32,
    pub handle: Bytes,
}

impl_request_id!(Handle);

impl Payload for Handle {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.handle);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            handle: bytes.try_read_bytes()?,
        })
    }
}
