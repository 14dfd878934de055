mod attrs;
pub mod codec;
mod data;
mod extended;
mod extended_reply;
mod file;
mod file_attrs;
mod fstat;
mod handle;
mod handle_attrs;
mod init;
mod name;
mod open;
mod path;
mod path_attrs;
mod read;
mod rename;
mod stat;
mod status;
mod symlink;
mod version;
mod write;

use bytes::{Bytes, BytesMut};
use std::fmt;

use crate::error::ProtocolError;

pub use self::{
    attrs::Attrs,
    codec::{PacketReader, RawPacket, MAX_PACKET_LEN},
    data::Data,
    extended::Extended,
    extended_reply::ExtendedReply,
    file::DirectoryEntry,
    file_attrs::{
        Acl, AclEntry, AttrFlags, AttribBits, FileAttributes, FileTime, FileType,
    },
    fstat::Fstat,
    handle::Handle,
    handle_attrs::HandleAttrs,
    init::Init,
    name::Name,
    open::{Disposition, Open, OpenFlags},
    path::Path,
    path_attrs::PathAttrs,
    read::Read,
    rename::Rename,
    stat::Stat,
    status::{Status, StatusCode},
    symlink::{Link, Symlink},
    version::Version,
    write::Write,
};

pub(crate) use file_attrs::mode_string;

/// Version announced in `SSH_FXP_INIT`. Anything newer is reached through
/// the `version-select` extension.
pub const VERSION: u32 = 3;

/// Every packet body knows how to write and parse itself for a given
/// protocol version. The type byte and the length prefix belong to the
/// framing in [`codec`].
pub trait Payload: Sized {
    fn encode(&self, version: u32, bytes: &mut BytesMut);
    fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Init,
    Version,
    Open,
    Close,
    Read,
    Write,
    Lstat,
    Fstat,
    SetStat,
    FSetStat,
    OpenDir,
    ReadDir,
    Remove,
    MkDir,
    RmDir,
    RealPath,
    Stat,
    Rename,
    ReadLink,
    Symlink,
    Link,
    Status,
    Handle,
    Data,
    Name,
    Attrs,
    Extended,
    ExtendedReply,
}

impl PacketType {
    /// Only `INIT` and `VERSION` go without a request id.
    pub fn has_request_id(self) -> bool {
        !matches!(self, Self::Init | Self::Version)
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::Init => 1,
            PacketType::Version => 2,
            PacketType::Open => 3,
            PacketType::Close => 4,
            PacketType::Read => 5,
            PacketType::Write => 6,
            PacketType::Lstat => 7,
            PacketType::Fstat => 8,
            PacketType::SetStat => 9,
            PacketType::FSetStat => 10,
            PacketType::OpenDir => 11,
            PacketType::ReadDir => 12,
            PacketType::Remove => 13,
            PacketType::MkDir => 14,
            PacketType::RmDir => 15,
            PacketType::RealPath => 16,
            PacketType::Stat => 17,
            PacketType::Rename => 18,
            PacketType::ReadLink => 19,
            PacketType::Symlink => 20,
            PacketType::Link => 21,
            PacketType::Status => 101,
            PacketType::Handle => 102,
            PacketType::Data => 103,
            PacketType::Name => 104,
            PacketType::Attrs => 105,
            PacketType::Extended => 200,
            PacketType::ExtendedReply => 201,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Init,
            2 => Self::Version,
            3 => Self::Open,
            4 => Self::Close,
            5 => Self::Read,
            6 => Self::Write,
            7 => Self::Lstat,
            8 => Self::Fstat,
            9 => Self::SetStat,
            10 => Self::FSetStat,
            11 => Self::OpenDir,
            12 => Self::ReadDir,
            13 => Self::Remove,
            14 => Self::MkDir,
            15 => Self::RmDir,
            16 => Self::RealPath,
            17 => Self::Stat,
            18 => Self::Rename,
            19 => Self::ReadLink,
            20 => Self::Symlink,
            21 => Self::Link,
            101 => Self::Status,
            102 => Self::Handle,
            103 => Self::Data,
            104 => Self::Name,
            105 => Self::Attrs,
            200 => Self::Extended,
            201 => Self::ExtendedReply,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

macro_rules! impl_packet_for {
    ($name:ident, $packet:ty) => {
        impl From<$name> for $packet {
            fn from(input: $name) -> Self {
                Self::$name(input)
            }
        }
    };
}

pub(crate) use impl_packet_for;

macro_rules! impl_request_id {
    ($packet:ty) => {
        impl $packet {
            pub fn id(&self) -> u32 {
                self.id
            }
        }
    };
}

pub(crate) use impl_request_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Init(Init),
    Open(Open),
    Close(Handle),
    Read(Read),
    Write(Write),
    Lstat(Stat),
    Fstat(Fstat),
    SetStat(PathAttrs),
    FSetStat(HandleAttrs),
    OpenDir(Path),
    ReadDir(Handle),
    Remove(Path),
    MkDir(PathAttrs),
    RmDir(Path),
    RealPath(Path),
    Stat(Stat),
    Rename(Rename),
    ReadLink(Path),
    Symlink(Symlink),
    Link(Link),
    Extended(Extended),
}

impl_packet_for!(Init, Request);
impl_packet_for!(Open, Request);
impl_packet_for!(Read, Request);
impl_packet_for!(Write, Request);
impl_packet_for!(Fstat, Request);
impl_packet_for!(Rename, Request);
impl_packet_for!(Symlink, Request);
impl_packet_for!(Link, Request);
impl_packet_for!(Extended, Request);

impl Request {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Init(_) => PacketType::Init,
            Self::Open(_) => PacketType::Open,
            Self::Close(_) => PacketType::Close,
            Self::Read(_) => PacketType::Read,
            Self::Write(_) => PacketType::Write,
            Self::Lstat(_) => PacketType::Lstat,
            Self::Fstat(_) => PacketType::Fstat,
            Self::SetStat(_) => PacketType::SetStat,
            Self::FSetStat(_) => PacketType::FSetStat,
            Self::OpenDir(_) => PacketType::OpenDir,
            Self::ReadDir(_) => PacketType::ReadDir,
            Self::Remove(_) => PacketType::Remove,
            Self::MkDir(_) => PacketType::MkDir,
            Self::RmDir(_) => PacketType::RmDir,
            Self::RealPath(_) => PacketType::RealPath,
            Self::Stat(_) => PacketType::Stat,
            Self::Rename(_) => PacketType::Rename,
            Self::ReadLink(_) => PacketType::ReadLink,
            Self::Symlink(_) => PacketType::Symlink,
            Self::Link(_) => PacketType::Link,
            Self::Extended(_) => PacketType::Extended,
        }
    }

    /// Request id, `None` for `INIT`.
    pub fn id(&self) -> Option<u32> {
        Some(match self {
            Self::Init(_) => return None,
            Self::Open(p) => p.id(),
            Self::Close(p) | Self::ReadDir(p) => p.id(),
            Self::Read(p) => p.id(),
            Self::Write(p) => p.id(),
            Self::Lstat(p) | Self::Stat(p) => p.id(),
            Self::Fstat(p) => p.id(),
            Self::SetStat(p) | Self::MkDir(p) => p.id(),
            Self::FSetStat(p) => p.id(),
            Self::OpenDir(p) | Self::Remove(p) | Self::RmDir(p) | Self::RealPath(p) | Self::ReadLink(p) => {
                p.id()
            }
            Self::Rename(p) => p.id(),
            Self::Symlink(p) => p.id(),
            Self::Link(p) => p.id(),
            Self::Extended(p) => p.id(),
        })
    }

    /// Frames the request for the wire.
    pub fn to_bytes(&self, version: u32) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Self::Init(p) => p.encode(version, &mut body),
            Self::Open(p) => p.encode(version, &mut body),
            Self::Close(p) | Self::ReadDir(p) => p.encode(version, &mut body),
            Self::Read(p) => p.encode(version, &mut body),
            Self::Write(p) => p.encode(version, &mut body),
            Self::Lstat(p) | Self::Stat(p) => p.encode(version, &mut body),
            Self::Fstat(p) => p.encode(version, &mut body),
            Self::SetStat(p) | Self::MkDir(p) => p.encode(version, &mut body),
            Self::FSetStat(p) => p.encode(version, &mut body),
            Self::OpenDir(p) | Self::Remove(p) | Self::RmDir(p) | Self::RealPath(p) | Self::ReadLink(p) => {
                p.encode(version, &mut body);
            }
            Self::Rename(p) => p.encode(version, &mut body),
            Self::Symlink(p) => p.encode(version, &mut body),
            Self::Link(p) => p.encode(version, &mut body),
            Self::Extended(p) => p.encode(version, &mut body),
        }

        codec::frame(self.packet_type(), &body)
    }

    /// Parses a request body, as a server would.
    pub fn decode(packet: RawPacket, version: u32) -> Result<Self, ProtocolError> {
        let mut bytes = packet.body;
        let bytes = &mut bytes;

        let request = match packet.packet_type {
            PacketType::Init => Self::Init(Init::decode(bytes, version)?),
            PacketType::Open => Self::Open(Open::decode(bytes, version)?),
            PacketType::Close => Self::Close(Handle::decode(bytes, version)?),
            PacketType::Read => Self::Read(Read::decode(bytes, version)?),
            PacketType::Write => Self::Write(Write::decode(bytes, version)?),
            PacketType::Lstat => Self::Lstat(Stat::decode(bytes, version)?),
            PacketType::Fstat => Self::Fstat(Fstat::decode(bytes, version)?),
            PacketType::SetStat => Self::SetStat(PathAttrs::decode(bytes, version)?),
            PacketType::FSetStat => Self::FSetStat(HandleAttrs::decode(bytes, version)?),
            PacketType::OpenDir => Self::OpenDir(Path::decode(bytes, version)?),
            PacketType::ReadDir => Self::ReadDir(Handle::decode(bytes, version)?),
            PacketType::Remove => Self::Remove(Path::decode(bytes, version)?),
            PacketType::MkDir => Self::MkDir(PathAttrs::decode(bytes, version)?),
            PacketType::RmDir => Self::RmDir(Path::decode(bytes, version)?),
            PacketType::RealPath => Self::RealPath(Path::decode(bytes, version)?),
            PacketType::Stat => Self::Stat(Stat::decode(bytes, version)?),
            PacketType::Rename => Self::Rename(Rename::decode(bytes, version)?),
            PacketType::ReadLink => Self::ReadLink(Path::decode(bytes, version)?),
            PacketType::Symlink => Self::Symlink(Symlink::decode(bytes, version)?),
            PacketType::Link => Self::Link(Link::decode(bytes, version)?),
            PacketType::Extended => Self::Extended(Extended::decode(bytes, version)?),
            other => {
                return Err(ProtocolError::BadMessage(format!(
                    "{other} is not a request"
                )))
            }
        };

        Ok(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Version(Version),
    Status(Status),
    Handle(Handle),
    Data(Data),
    Name(Name),
    Attrs(Attrs),
    ExtendedReply(ExtendedReply),
}

impl_packet_for!(Version, Response);
impl_packet_for!(Status, Response);
impl_packet_for!(Handle, Response);
impl_packet_for!(Data, Response);
impl_packet_for!(Name, Response);
impl_packet_for!(Attrs, Response);
impl_packet_for!(ExtendedReply, Response);

impl Response {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Version(_) => PacketType::Version,
            Self::Status(_) => PacketType::Status,
            Self::Handle(_) => PacketType::Handle,
            Self::Data(_) => PacketType::Data,
            Self::Name(_) => PacketType::Name,
            Self::Attrs(_) => PacketType::Attrs,
            Self::ExtendedReply(_) => PacketType::ExtendedReply,
        }
    }

    pub fn id(&self) -> Option<u32> {
        Some(match self {
            Self::Version(_) => return None,
            Self::Status(p) => p.id(),
            Self::Handle(p) => p.id(),
            Self::Data(p) => p.id(),
            Self::Name(p) => p.id(),
            Self::Attrs(p) => p.id(),
            Self::ExtendedReply(p) => p.id(),
        })
    }

    pub fn status(id: u32, status_code: StatusCode, msg: &str) -> Self {
        Self::Status(Status::new(id, status_code, msg))
    }

    pub fn to_bytes(&self, version: u32) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Self::Version(p) => p.encode(version, &mut body),
            Self::Status(p) => p.encode(version, &mut body),
            Self::Handle(p) => p.encode(version, &mut body),
            Self::Data(p) => p.encode(version, &mut body),
            Self::Name(p) => p.encode(version, &mut body),
            Self::Attrs(p) => p.encode(version, &mut body),
            Self::ExtendedReply(p) => p.encode(version, &mut body),
        }

        codec::frame(self.packet_type(), &body)
    }

    pub fn decode(packet: RawPacket, version: u32) -> Result<Self, ProtocolError> {
        let mut bytes = packet.body;
        let bytes = &mut bytes;

        let response = match packet.packet_type {
            PacketType::Version => Self::Version(Version::decode(bytes, version)?),
            PacketType::Status => Self::Status(Status::decode(bytes, version)?),
            PacketType::Handle => Self::Handle(Handle::decode(bytes, version)?),
            PacketType::Data => Self::Data(Data::decode(bytes, version)?),
            PacketType::Name => Self::Name(Name::decode(bytes, version)?),
            PacketType::Attrs => Self::Attrs(Attrs::decode(bytes, version)?),
            PacketType::ExtendedReply => {
                Self::ExtendedReply(ExtendedReply::decode(bytes, version)?)
            }
            other => {
                return Err(ProtocolError::BadMessage(format!(
                    "{other} is not a response"
                )))
            }
        };

        Ok(response)
    }
}
