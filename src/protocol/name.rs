use bytes::{BufMut, Bytes, BytesMut};

use crate::{buf::TryBuf, error::ProtocolError};

use super::{impl_request_id, DirectoryEntry, Payload};

/// Implementation for `SSH_FXP_NAME`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub id: u32,
    pub files: Vec<DirectoryEntry>,
}

impl_request_id!(Name);

impl Payload for Name {
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_u32(self.files.len() as u32);

        for file in &self.files {
            file.encode(version, bytes);
        }
    }

    /// The optional v6 end-of-list flag after the entries is not needed,
    /// an empty `NAME` or `EOF` status already ends a listing.
    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let count = bytes.try_read_u32()?;

        let mut files = Vec::new();
        for _ in 0..count {
            files.push(DirectoryEntry::decode(bytes, version)?);
        }

        Ok(Self { id, files })
    }
}
