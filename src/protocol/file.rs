use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{mode_string, FileAttributes, FileType};

/// One entry of a `SSH_FXP_NAME` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub filename: String,
    /// `ls -l` style line, only sent by v3 servers.
    pub longname: Option<String>,
    pub attrs: FileAttributes,
}

impl DirectoryEntry {
    pub fn new(filename: impl Into<String>, attrs: FileAttributes) -> Self {
        Self {
            filename: filename.into(),
            longname: None,
            attrs,
        }
    }

    /// Get formed longname
    pub fn format_longname(&self) -> String {
        let owner = self
            .attrs
            .owner
            .clone()
            .unwrap_or_else(|| self.attrs.uid.unwrap_or(0).to_string());
        let group = self
            .attrs
            .group
            .clone()
            .unwrap_or_else(|| self.attrs.gid.unwrap_or(0).to_string());

        let date = self
            .attrs
            .mtime
            .and_then(|t| t.to_datetime())
            .map(|datetime| datetime.format("%b %d %Y %H:%M").to_string())
            .unwrap_or_default();

        format!(
            "{} {} {} {} {} {} {}",
            mode_string(&self.attrs),
            self.attrs.link_count.unwrap_or(1),
            owner,
            group,
            self.attrs.len(),
            date,
            self.filename
        )
    }

    pub(super) fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_str(&self.filename);

        if version < 4 {
            match &self.longname {
                Some(longname) => bytes.put_str(longname),
                None => bytes.put_str(&self.format_longname()),
            }
        }

        self.attrs.encode(version, bytes);
    }

    /// v3 attributes often lack the type bits, the long name then decides.
    pub(super) fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let filename = bytes.try_read_string()?;
        let longname = if version < 4 {
            Some(bytes.try_read_string()?)
        } else {
            None
        };

        let mut attrs = FileAttributes::decode(bytes, version)?;
        if attrs.file_type.is_none() {
            attrs.file_type = longname
                .as_deref()
                .map(|longname| FileType::from_longname(longname).unwrap_or(FileType::Special));
        }

        Ok(Self {
            filename,
            longname,
            attrs,
        })
    }
}
