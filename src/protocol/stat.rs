use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, AttrFlags, Payload};

/// Implementation for `SSH_FXP_STAT` and `SSH_FXP_LSTAT`. From v4 the
/// request names the attributes it is interested in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub id: u32,
    pub path: String,
    pub flags: AttrFlags,
}

impl_request_id!(Stat);

impl Payload for Stat {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_str(&self.path);

        if version >= 4 {
            bytes.put_u32(self.flags.bits());
        }
    }

    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let path = bytes.try_read_string()?;
        let flags = if version >= 4 && bytes.has_remaining() {
            AttrFlags::from_bits_retain(bytes.try_read_u32()?)
        } else {
            AttrFlags::empty()
        };

        Ok(Self { id, path, flags })
    }
}
