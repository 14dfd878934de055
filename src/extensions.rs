//! Payloads of the `SSH_FXP_EXTENDED` requests and `VERSION` extensions the
//! client understands.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

/// `VERSION` extension listing every protocol version the server speaks.
pub const VERSIONS: &str = "versions";
/// Request that switches the session to another protocol version.
pub const VERSION_SELECT: &str = "version-select";
pub const LIMITS: &str = "limits@openssh.com";
pub const HARDLINK: &str = "hardlink@openssh.com";

/// Parses the comma separated `versions` value, skipping entries that are
/// not numbers.
pub fn parse_versions(value: &str) -> Vec<u32> {
    value
        .split(',')
        .filter_map(|version| version.trim().parse().ok())
        .collect()
}

/// Request data for `version-select`: the version as a decimal string.
pub fn version_select(version: u32) -> Bytes {
    let mut bytes = BytesMut::new();
    bytes.put_str(&version.to_string());
    bytes.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitsExtension {
    pub max_packet_len: u64,
    pub max_read_len: u64,
    pub max_write_len: u64,
    pub max_open_handles: u64,
}

impl LimitsExtension {
    pub fn decode(mut bytes: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            max_packet_len: bytes.try_read_u64()?,
            max_read_len: bytes.try_read_u64()?,
            max_write_len: bytes.try_read_u64()?,
            max_open_handles: bytes.try_read_u64()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_u64(self.max_packet_len);
        bytes.put_u64(self.max_read_len);
        bytes.put_u64(self.max_write_len);
        bytes.put_u64(self.max_open_handles);
        bytes.freeze()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardlinkExtension {
    pub oldpath: String,
    pub newpath: String,
}

impl HardlinkExtension {
    pub fn decode(mut bytes: Bytes) -> Result<Self, ProtocolError> {
        Ok(Self {
            oldpath: bytes.try_read_string()?,
            newpath: bytes.try_read_string()?,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::new();
        bytes.put_str(&self.oldpath);
        bytes.put_str(&self.newpath);
        bytes.freeze()
    }
}
