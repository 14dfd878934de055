use bytes::{BufMut, Bytes, BytesMut};

use crate::{buf::TryBuf, error::ProtocolError};

use super::{impl_request_id, FileAttributes, Payload};

/// Implementation for `SSH_FXP_ATTRS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attrs {
    pub id: u32,
    pub attrs: FileAttributes,
}

impl_request_id!(Attrs);

impl Payload for Attrs {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        self.attrs.encode(version, bytes);
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: bytes.try_read_u32()?,
            attrs: FileAttributes::decode(bytes, version)?,
        })
    }
}
