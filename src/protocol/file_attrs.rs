use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::{
    buf::{PutBuf, TryBuf},
    error::ProtocolError,
};

/// `SSH_FILEXFER_ATTR_*` flags. Values are shared by
/// every protocol version; which of them are legal depends on the version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrFlags(u32);

bitflags! {
    impl AttrFlags: u32 {
        const SIZE = 0x0000_0001;
        /// v3 and lower
        const UIDGID = 0x0000_0002;
        const PERMISSIONS = 0x0000_0004;
        /// `ACMODTIME` in v3 (atime and mtime together), `ACCESSTIME` from v4
        const ACCESSTIME = 0x0000_0008;
        const CREATETIME = 0x0000_0010;
        const MODIFYTIME = 0x0000_0020;
        const ACL = 0x0000_0040;
        const OWNERGROUP = 0x0000_0080;
        const SUBSECOND_TIMES = 0x0000_0100;
        const BITS = 0x0000_0200;
        const ALLOCATION_SIZE = 0x0000_0400;
        const TEXT_HINT = 0x0000_0800;
        const MIME_TYPE = 0x0000_1000;
        const LINK_COUNT = 0x0000_2000;
        const UNTRANSLATED_NAME = 0x0000_4000;
        const CTIME = 0x0000_8000;
        const EXTENDED = 0x8000_0000;
    }
}

impl AttrFlags {
    /// Flags a peer may legally interpret at `version`. Bits outside of
    /// this mask are ignored on decode, the fields they announce are not
    /// on the wire for that version.
    pub fn supported(version: u32) -> Self {
        let mut flags = Self::SIZE | Self::PERMISSIONS | Self::ACCESSTIME | Self::EXTENDED;

        if version <= 3 {
            flags |= Self::UIDGID;
        }

        if version >= 4 {
            flags |= Self::CREATETIME
                | Self::MODIFYTIME
                | Self::ACL
                | Self::OWNERGROUP
                | Self::SUBSECOND_TIMES;
        }

        if version >= 5 {
            flags |= Self::BITS;
        }

        if version >= 6 {
            flags |= Self::ALLOCATION_SIZE
                | Self::TEXT_HINT
                | Self::MIME_TYPE
                | Self::LINK_COUNT
                | Self::UNTRANSLATED_NAME
                | Self::CTIME;
        }

        flags
    }
}

/// File type as carried by the v4+ `type` byte. For v3 it is derived from
/// the permission bits or from the long name of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Special,
    Unknown,
    Socket,
    CharDevice,
    BlockDevice,
    Fifo,
}

impl FileType {
    pub fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Regular,
            2 => Self::Directory,
            3 => Self::Symlink,
            4 => Self::Special,
            6 => Self::Socket,
            7 => Self::CharDevice,
            8 => Self::BlockDevice,
            9 => Self::Fifo,
            _ => Self::Unknown,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Self::Regular => 1,
            Self::Directory => 2,
            Self::Symlink => 3,
            Self::Special => 4,
            Self::Unknown => 5,
            Self::Socket => 6,
            Self::CharDevice => 7,
            Self::BlockDevice => 8,
            Self::Fifo => 9,
        }
    }

    /// Derives the type from the Unix `S_IFMT` bits. `None` when no type
    /// bits are set at all.
    pub fn from_permissions(mode: u32) -> Option<Self> {
        match mode & 0o170_000 {
            0 => None,
            0o040_000 => Some(Self::Directory),
            0o100_000 => Some(Self::Regular),
            0o120_000 => Some(Self::Symlink),
            0o010_000 => Some(Self::Fifo),
            0o020_000 => Some(Self::CharDevice),
            0o060_000 => Some(Self::BlockDevice),
            0o140_000 => Some(Self::Socket),
            0o160_000 => Some(Self::Special),
            _ => Some(Self::Unknown),
        }
    }

    /// Best-effort type detection from an `ls -l` style long name
    /// (`drwxr-xr-x ...`). Only the first character is significant once the
    /// permission triplets are recognised.
    pub fn from_longname(longname: &str) -> Option<Self> {
        let mut chars = longname.chars();
        let first = chars.next()?;
        if first == '/' {
            return None;
        }

        let triplets: Vec<char> = chars.take(9).collect();
        if triplets.len() != 9 {
            return None;
        }

        let recognised = triplets.chunks(3).all(|t| {
            matches!(t[0], 'r' | '-')
                && matches!(t[1], 'w' | '-')
                && matches!(t[2], 'x' | 's' | 't' | 'S' | 'T' | '-')
        });

        if !recognised {
            return None;
        }

        Some(match first {
            '-' => Self::Regular,
            'd' => Self::Directory,
            'l' => Self::Symlink,
            _ => Self::Special,
        })
    }

    fn mode_char(self) -> char {
        match self {
            Self::Directory => 'd',
            Self::Symlink => 'l',
            Self::Socket => 's',
            Self::CharDevice => 'c',
            Self::BlockDevice => 'b',
            Self::Fifo => 'p',
            Self::Special | Self::Unknown => '?',
            Self::Regular => '-',
        }
    }
}

/// Seconds since the epoch plus optional sub-second precision (v4+).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: Option<u32>,
}

impl FileTime {
    pub fn new(seconds: i64) -> Self {
        Self {
            seconds,
            nanos: None,
        }
    }

    pub fn now() -> Self {
        Self::new(Utc::now().timestamp())
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.seconds, self.nanos.unwrap_or(0))
    }

    /// `None` when the platform clock can not represent the time.
    pub fn to_system_time(&self) -> Option<SystemTime> {
        let nanos = Duration::from_nanos(u64::from(self.nanos.unwrap_or(0)));
        let seconds = Duration::from_secs(self.seconds.unsigned_abs());
        let whole = if self.seconds >= 0 {
            UNIX_EPOCH.checked_add(seconds)
        } else {
            UNIX_EPOCH.checked_sub(seconds)
        };
        whole?.checked_add(nanos)
    }
}

impl From<SystemTime> for FileTime {
    fn from(time: SystemTime) -> Self {
        let datetime = DateTime::<Utc>::from(time);
        Self {
            seconds: datetime.timestamp(),
            nanos: Some(datetime.timestamp_subsec_nanos()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub ace_type: u32,
    pub ace_flag: u32,
    pub ace_mask: u32,
    pub who: String,
}

/// Access control list. `flags` only travels on the wire from v6.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub flags: u32,
    pub entries: Vec<AclEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttribBits {
    pub bits: u32,
    pub valid: u32,
}

/// File attributes, the union of every field defined from v3 to v6.
///
/// Fields that the negotiated version cannot carry are left out when
/// encoding and never populated when decoding: `uid`/`gid` only exist up to
/// v3, `owner`/`group`, `createtime`, sub-second times and the ACL from v4,
/// the attribute bits from v5, the remaining extras from v6.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub file_type: Option<FileType>,
    pub size: Option<u64>,
    pub allocation_size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permissions: Option<u32>,
    pub atime: Option<FileTime>,
    pub createtime: Option<FileTime>,
    pub mtime: Option<FileTime>,
    pub ctime: Option<FileTime>,
    pub acl: Option<Acl>,
    pub attrib_bits: Option<AttribBits>,
    pub text_hint: Option<u8>,
    pub mime_type: Option<String>,
    pub link_count: Option<u32>,
    pub untranslated_name: Option<String>,
    pub extended: BTreeMap<String, String>,
}

macro_rules! impl_fn_type {
    ($get_name:ident, $doc_name:expr, $type:ident) => {
        #[doc = "Returns `true` if is a "]
        #[doc = $doc_name]
        pub fn $get_name(&self) -> bool {
            self.file_type() == Some(FileType::$type)
        }
    };
}

impl FileAttributes {
    impl_fn_type!(is_dir, "dir", Directory);
    impl_fn_type!(is_regular, "regular", Regular);
    impl_fn_type!(is_symlink, "symlink", Symlink);
    impl_fn_type!(is_character, "character", CharDevice);
    impl_fn_type!(is_block, "block", BlockDevice);
    impl_fn_type!(is_fifo, "fifo", Fifo);

    /// Explicit type, or the one implied by the permission bits.
    pub fn file_type(&self) -> Option<FileType> {
        self.file_type
            .or_else(|| self.permissions.and_then(FileType::from_permissions))
    }

    /// Returns the size of the file
    pub fn len(&self) -> u64 {
        self.size.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the last access time
    pub fn accessed(&self) -> std::io::Result<SystemTime> {
        self.atime
            .and_then(|t| t.to_system_time())
            .ok_or_else(|| std::io::ErrorKind::InvalidData.into())
    }

    /// Returns the last modification time
    pub fn modified(&self) -> std::io::Result<SystemTime> {
        self.mtime
            .and_then(|t| t.to_system_time())
            .ok_or_else(|| std::io::ErrorKind::InvalidData.into())
    }

    fn has_subsecond_times(&self) -> bool {
        [self.atime, self.createtime, self.mtime, self.ctime]
            .iter()
            .flatten()
            .any(|t| t.nanos.is_some())
    }

    /// Flags describing which fields will be written at `version`.
    pub fn flags(&self, version: u32) -> AttrFlags {
        let mut flags = AttrFlags::empty();

        flags.set(AttrFlags::SIZE, self.size.is_some());
        flags.set(AttrFlags::UIDGID, self.uid.is_some() || self.gid.is_some());
        flags.set(
            AttrFlags::OWNERGROUP,
            self.owner.is_some() || self.group.is_some(),
        );
        flags.set(AttrFlags::PERMISSIONS, self.permissions.is_some());

        if version <= 3 {
            flags.set(
                AttrFlags::ACCESSTIME,
                self.atime.is_some() || self.mtime.is_some(),
            );
        } else {
            flags.set(AttrFlags::ACCESSTIME, self.atime.is_some());
        }

        flags.set(AttrFlags::CREATETIME, self.createtime.is_some());
        flags.set(AttrFlags::MODIFYTIME, self.mtime.is_some());
        flags.set(AttrFlags::CTIME, self.ctime.is_some());
        flags.set(AttrFlags::SUBSECOND_TIMES, self.has_subsecond_times());
        flags.set(AttrFlags::ACL, self.acl.is_some());
        flags.set(AttrFlags::BITS, self.attrib_bits.is_some());
        flags.set(AttrFlags::ALLOCATION_SIZE, self.allocation_size.is_some());
        flags.set(AttrFlags::TEXT_HINT, self.text_hint.is_some());
        flags.set(AttrFlags::MIME_TYPE, self.mime_type.is_some());
        flags.set(AttrFlags::LINK_COUNT, self.link_count.is_some());
        flags.set(
            AttrFlags::UNTRANSLATED_NAME,
            self.untranslated_name.is_some(),
        );
        flags.set(AttrFlags::EXTENDED, !self.extended.is_empty());

        flags & AttrFlags::supported(version)
    }

    /// Serializes the attribute block for the given protocol version.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(&self, version: u32, bytes: &mut BytesMut) {
        let flags = self.flags(version);
        bytes.put_u32(flags.bits());

        if version >= 4 {
            bytes.put_u8(self.file_type.unwrap_or(FileType::Unknown).to_wire());
        }

        if let Some(size) = self.size {
            bytes.put_u64(size);
        }

        if flags.contains(AttrFlags::ALLOCATION_SIZE) {
            bytes.put_u64(self.allocation_size.unwrap_or(0));
        }

        if flags.contains(AttrFlags::UIDGID) {
            // -1 leaves the id untouched on chown(2)
            bytes.put_u32(self.uid.unwrap_or(u32::MAX));
            bytes.put_u32(self.gid.unwrap_or(u32::MAX));
        }

        if flags.contains(AttrFlags::OWNERGROUP) {
            bytes.put_str(self.owner.as_deref().unwrap_or(""));
            bytes.put_str(self.group.as_deref().unwrap_or(""));
        }

        if let Some(permissions) = self.permissions {
            bytes.put_u32(permissions);
        }

        if version <= 3 {
            if flags.contains(AttrFlags::ACCESSTIME) {
                bytes.put_u32(self.atime.map_or(0, |t| t.seconds as u32));
                bytes.put_u32(self.mtime.map_or(0, |t| t.seconds as u32));
            }
        } else {
            let subsecond = flags.contains(AttrFlags::SUBSECOND_TIMES);
            for (flag, time) in [
                (AttrFlags::ACCESSTIME, self.atime),
                (AttrFlags::CREATETIME, self.createtime),
                (AttrFlags::MODIFYTIME, self.mtime),
                (AttrFlags::CTIME, self.ctime),
            ] {
                if let (true, Some(time)) = (flags.contains(flag), time) {
                    bytes.put_i64(time.seconds);
                    if subsecond {
                        bytes.put_u32(time.nanos.unwrap_or(0));
                    }
                }
            }
        }

        if let (true, Some(acl)) = (flags.contains(AttrFlags::ACL), &self.acl) {
            if version >= 6 {
                let mut inner = BytesMut::new();
                inner.put_u32(acl.flags);
                encode_acl_entries(&acl.entries, &mut inner);
                bytes.put_bytes_prefixed(&inner);
            } else {
                encode_acl_entries(&acl.entries, bytes);
            }
        }

        if let (true, Some(bits)) = (flags.contains(AttrFlags::BITS), self.attrib_bits) {
            bytes.put_u32(bits.bits);
            bytes.put_u32(bits.valid);
        }

        if let (true, Some(hint)) = (flags.contains(AttrFlags::TEXT_HINT), self.text_hint) {
            bytes.put_u8(hint);
        }

        if let (true, Some(mime)) = (flags.contains(AttrFlags::MIME_TYPE), &self.mime_type) {
            bytes.put_str(mime);
        }

        if let (true, Some(count)) = (flags.contains(AttrFlags::LINK_COUNT), self.link_count) {
            bytes.put_u32(count);
        }

        if let (true, Some(name)) = (
            flags.contains(AttrFlags::UNTRANSLATED_NAME),
            &self.untranslated_name,
        ) {
            bytes.put_str(name);
        }

        if flags.contains(AttrFlags::EXTENDED) {
            bytes.put_u32(self.extended.len() as u32);
            for (name, data) in &self.extended {
                bytes.put_str(name);
                bytes.put_str(data);
            }
        }
    }

    /// Parses an attribute block. The fields are walked in their fixed wire
    /// order; a flag that the version does not define is ignored rather
    /// than read, since the field it names is not on the wire.
    pub fn decode(bytes: &mut Bytes, version: u32) -> Result<Self, ProtocolError> {
        let raw = AttrFlags::from_bits_retain(bytes.try_read_u32()?);
        let flags = raw & AttrFlags::supported(version);
        let mut attrs = Self::default();

        if version >= 4 {
            attrs.file_type = Some(FileType::from_wire(bytes.try_read_u8()?));
        }

        if flags.contains(AttrFlags::SIZE) {
            attrs.size = Some(bytes.try_read_u64()?);
        }

        if flags.contains(AttrFlags::ALLOCATION_SIZE) {
            attrs.allocation_size = Some(bytes.try_read_u64()?);
        }

        if flags.contains(AttrFlags::UIDGID) {
            attrs.uid = Some(bytes.try_read_u32()?);
            attrs.gid = Some(bytes.try_read_u32()?);
        }

        if flags.contains(AttrFlags::OWNERGROUP) {
            attrs.owner = Some(bytes.try_read_string()?);
            attrs.group = Some(bytes.try_read_string()?);
        }

        if flags.contains(AttrFlags::PERMISSIONS) {
            let permissions = bytes.try_read_u32()?;
            attrs.permissions = Some(permissions);
            if attrs.file_type.is_none() {
                attrs.file_type = FileType::from_permissions(permissions);
            }
        }

        if version <= 3 {
            if flags.contains(AttrFlags::ACCESSTIME) {
                attrs.atime = Some(FileTime::new(i64::from(bytes.try_read_u32()?)));
                attrs.mtime = Some(FileTime::new(i64::from(bytes.try_read_u32()?)));
            }
        } else {
            let subsecond = flags.contains(AttrFlags::SUBSECOND_TIMES);
            let mut read_time = |flag: AttrFlags| -> Result<Option<FileTime>, ProtocolError> {
                if !flags.contains(flag) {
                    return Ok(None);
                }

                let seconds = bytes.try_read_i64()?;
                let nanos = if subsecond {
                    Some(bytes.try_read_u32()?)
                } else {
                    None
                };

                Ok(Some(FileTime { seconds, nanos }))
            };

            attrs.atime = read_time(AttrFlags::ACCESSTIME)?;
            attrs.createtime = read_time(AttrFlags::CREATETIME)?;
            attrs.mtime = read_time(AttrFlags::MODIFYTIME)?;
            attrs.ctime = read_time(AttrFlags::CTIME)?;
        }

        if flags.contains(AttrFlags::ACL) {
            attrs.acl = Some(if version >= 6 {
                let mut inner = bytes.try_read_bytes()?;
                let flags = inner.try_read_u32()?;
                Acl {
                    flags,
                    entries: decode_acl_entries(&mut inner)?,
                }
            } else {
                Acl {
                    flags: 0,
                    entries: decode_acl_entries(bytes)?,
                }
            });
        }

        if flags.contains(AttrFlags::BITS) {
            attrs.attrib_bits = Some(AttribBits {
                bits: bytes.try_read_u32()?,
                valid: bytes.try_read_u32()?,
            });
        }

        if flags.contains(AttrFlags::TEXT_HINT) {
            attrs.text_hint = Some(bytes.try_read_u8()?);
        }

        if flags.contains(AttrFlags::MIME_TYPE) {
            attrs.mime_type = Some(bytes.try_read_string()?);
        }

        if flags.contains(AttrFlags::LINK_COUNT) {
            attrs.link_count = Some(bytes.try_read_u32()?);
        }

        if flags.contains(AttrFlags::UNTRANSLATED_NAME) {
            attrs.untranslated_name = Some(bytes.try_read_string()?);
        }

        if flags.contains(AttrFlags::EXTENDED) {
            let count = bytes.try_read_u32()?;
            for _ in 0..count {
                let name = bytes.try_read_string()?;
                let data = bytes.try_read_string()?;
                let _ = attrs.extended.insert(name, data);
            }
        }

        Ok(attrs)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_acl_entries(entries: &[AclEntry], bytes: &mut BytesMut) {
    bytes.put_u32(entries.len() as u32);
    for entry in entries {
        bytes.put_u32(entry.ace_type);
        bytes.put_u32(entry.ace_flag);
        bytes.put_u32(entry.ace_mask);
        bytes.put_str(&entry.who);
    }
}

fn decode_acl_entries<B: Buf>(bytes: &mut B) -> Result<Vec<AclEntry>, ProtocolError> {
    let count = bytes.try_read_u32()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        entries.push(AclEntry {
            ace_type: bytes.try_read_u32()?,
            ace_flag: bytes.try_read_u32()?,
            ace_mask: bytes.try_read_u32()?,
            who: bytes.try_read_string()?,
        });
    }

    Ok(entries)
}

/// `ls -l` style permission column, e.g. `drwxr-xr-x`.
pub(crate) fn mode_string(attrs: &FileAttributes) -> String {
    let permissions = attrs.permissions.unwrap_or(0);
    let type_char = attrs.file_type().map_or('-', FileType::mode_char);

    let triplet = |bits: u32| {
        format!(
            "{}{}{}",
            if bits & 0o4 != 0 { 'r' } else { '-' },
            if bits & 0o2 != 0 { 'w' } else { '-' },
            if bits & 0o1 != 0 { 'x' } else { '-' },
        )
    };

    format!(
        "{}{}{}{}",
        type_char,
        triplet((permissions >> 6) & 0o7),
        triplet((permissions >> 3) & 0o7),
        triplet(permissions & 0o7)
    )
}
