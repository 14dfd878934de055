use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Body of the requests that carry nothing but a path: `OPENDIR`, `REMOVE`,
/// `RMDIR`, `REALPATH` and `READLINK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub id: u32,
    pub path: String,
}

impl_request_id!(Path);

impl Payload for Path {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.path);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            path: bytes.try_read_string()?,
        })
    }
}
