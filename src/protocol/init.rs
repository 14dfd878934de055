use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{Payload, VERSION};

/// Implementation for `SSH_FXP_INIT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Init {
    pub version: u32,
    pub extensions: BTreeMap<String, String>,
}

impl Init {
    pub fn new() -> Self {
        Self {
            version: VERSION,
            extensions: BTreeMap::new(),
        }
    }
}

impl Default for Init {
    fn default() -> Self {
        Self::new()
    }
}

impl Payload for Init {
    fn encode(&self, _version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.version);
        put_extensions(&self.extensions, bytes);
    }

    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        Ok(Self {
            version: bytes.try_read_u32()?,
            extensions: read_extensions(bytes)?,
        })
    }
}

pub(super) fn put_extensions(extensions: &BTreeMap<String, String>, bytes: &mut BytesMut) {
    for (name, data) in extensions {
        bytes.put_str(name);
        bytes.put_str(data);
    }
}

/// Extension pairs run to the end of the packet.
pub(super) fn read_extensions(bytes: &mut Bytes) -> Result<BTreeMap<String, String>, ProtocolError> {
    let mut extensions = BTreeMap::new();
    while bytes.has_remaining() {
        let name = bytes.try_read_string()?;
        let data = bytes.try_read_string()?;
        let _ = extensions.insert(name, data);
    }

    Ok(extensions)
}
