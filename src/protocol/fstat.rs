use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, AttrFlags, Payload};

/// Implementation for `SSH_FXP_FSTAT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fstat {
    pub id: u32,
    pub handle: Bytes,
    pub flags: AttrFlags,
}

impl_request_id!(Fstat);

impl Payload for Fstat {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_bytes_prefixed(&self.handle);

        if version >= 4 {
            bytes.put_u32(self.flags.bits());
        }
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let handle = bytes.try_read_bytes()?;
        let flags = if version >= 4 && bytes.has_remaining() {
            AttrFlags::from_bits_retain(bytes.try_read_u32()?)
        } else {
            AttrFlags::empty()
        };

        Ok(Self { id, handle, flags })
    }
}
