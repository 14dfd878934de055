use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Implementation for `SSH_FXP_DATA`
#[derive(Clone, PartialEq, Eq)]
pub struct Data {
    pub id: u32,
    pub data: Bytes,
}

impl_request_id!(Data);

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("id", &self.id)
            .field("data", &self.data.len())
            .finish()
    }
}

impl Payload for Data {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.data);
    }

    /// A trailing v6 end-of-file flag is ignored.
    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            data: bytes.try_read_bytes()?,
        })
    }
}
