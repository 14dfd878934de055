use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

use super::{impl_request_id, Payload};

/// Error codes for `SSH_FXP_STATUS`, every code defined up to v6.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    #[error("Ok")]
    Ok = 0,
    #[error("Eof")]
    Eof = 1,
    #[error("No such file")]
    NoSuchFile = 2,
    #[error("Permission denied")]
    PermissionDenied = 3,
    #[error("Failure")]
    Failure = 4,
    #[error("Bad message")]
    BadMessage = 5,
    #[error("No connection")]
    NoConnection = 6,
    #[error("Connection lost")]
    ConnectionLost = 7,
    #[error("Operation unsupported")]
    OpUnsupported = 8,
    #[error("Invalid handle")]
    InvalidHandle = 9,
    #[error("No such path")]
    NoSuchPath = 10,
    #[error("File already exists")]
    FileAlreadyExists = 11,
    #[error("Write protect")]
    WriteProtect = 12,
    #[error("No media")]
    NoMedia = 13,
    #[error("No space on filesystem")]
    NoSpaceOnFilesystem = 14,
    #[error("Quota exceeded")]
    QuotaExceeded = 15,
    #[error("Unknown principal")]
    UnknownPrincipal = 16,
    #[error("Lock conflict")]
    LockConflict = 17,
    #[error("Directory not empty")]
    DirNotEmpty = 18,
    #[error("Not a directory")]
    NotADirectory = 19,
    #[error("Invalid filename")]
    InvalidFilename = 20,
    #[error("Link loop")]
    LinkLoop = 21,
    #[error("Cannot delete")]
    CannotDelete = 22,
    #[error("Invalid parameter")]
    InvalidParameter = 23,
    #[error("File is a directory")]
    FileIsADirectory = 24,
    #[error("Byte range lock conflict")]
    ByteRangeLockConflict = 25,
    #[error("Byte range lock refused")]
    ByteRangeLockRefused = 26,
    #[error("Delete pending")]
    DeletePending = 27,
    #[error("File corrupt")]
    FileCorrupt = 28,
    #[error("Owner invalid")]
    OwnerInvalid = 29,
    #[error("Group invalid")]
    GroupInvalid = 30,
    #[error("No matching byte range lock")]
    NoMatchingByteRangeLock = 31,
}

impl From<u32> for StatusCode {
    /// Codes outside of the known range are reported as a generic failure.
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Eof,
            2 => Self::NoSuchFile,
            3 => Self::PermissionDenied,
            5 => Self::BadMessage,
            6 => Self::NoConnection,
            7 => Self::ConnectionLost,
            8 => Self::OpUnsupported,
            9 => Self::InvalidHandle,
            10 => Self::NoSuchPath,
            11 => Self::FileAlreadyExists,
            12 => Self::WriteProtect,
            13 => Self::NoMedia,
            14 => Self::NoSpaceOnFilesystem,
            15 => Self::QuotaExceeded,
            16 => Self::UnknownPrincipal,
            17 => Self::LockConflict,
            18 => Self::DirNotEmpty,
            19 => Self::NotADirectory,
            20 => Self::InvalidFilename,
            21 => Self::LinkLoop,
            22 => Self::CannotDelete,
            23 => Self::InvalidParameter,
            24 => Self::FileIsADirectory,
            25 => Self::ByteRangeLockConflict,
            26 => Self::ByteRangeLockRefused,
            27 => Self::DeletePending,
            28 => Self::FileCorrupt,
            29 => Self::OwnerInvalid,
            30 => Self::GroupInvalid,
            31 => Self::NoMatchingByteRangeLock,
            _ => Self::Failure,
        }
    }
}

/// Implementation for `SSH_FXP_STATUS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub id: u32,
    pub status_code: StatusCode,
    pub error_message: String,
    pub language_tag: String,
}

impl_request_id!(Status);

impl Status {
    pub fn new(id: u32, status_code: StatusCode, msg: &str) -> Self {
        Self {
            id,
            status_code,
            error_message: msg.to_owned(),
            language_tag: "en-US".to_owned(),
        }
    }
}

impl Payload for Status {
    fn encode(&self, version: u32, bytes: &mut BytesMut) {
        bytes.put_u32(self.id);
        bytes.put_u32(self.status_code as u32);

        if version >= 3 {
            bytes.put_str(&self.error_message);
            bytes.put_str(&self.language_tag);
        }
    }

    /// Before v3 the message and language tag do not exist, and some
    /// servers omit them later too, so both are optional on decode.
    fn decode(bytes: &mut Bytes, _version: u32) -> Result<Self, ProtocolError> {
        let id = bytes.try_read_u32()?;
        let status_code = StatusCode::from(bytes.try_read_u32()?);

        let error_message = if bytes.has_remaining() {
            bytes.try_read_string()?
        } else {
            String::new()
        };

        let language_tag = if bytes.has_remaining() {
            bytes.try_read_string()?
        } else {
            String::new()
        };

        Ok(Self {
            id,
            status_code,
            error_message,
            language_tag,
        })
    }
}
