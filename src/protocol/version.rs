use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

use crate::{buf::TryBuf, error::ProtocolError};

use super::{
    init::{put_extensions, read_extensions},
    Payload, VERSION,
};

/// Implementation for `SSH_FXP_VERSION`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub version: u32,
    pub extensions: BTreeMap<String, String>,
}

impl Version {
    pub fn new() -> Self {
        Self {
            version: VERSION,
            extensions: BTreeMap::new(),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl Payload for Version {
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
