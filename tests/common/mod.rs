//! In-memory SFTP peer used by the integration tests.
//!
//! It decodes whatever the client sends with the crate's own codec, keeps
//! a tiny filesystem and queues the responses. Output can be cut into
//! arbitrary chunks and responses can be delivered in reverse order to
//! exercise request id correlation.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use sftp_fs_client::{
    client::{path::normalize, ChannelId, Received, SessionConfig, SftpSession, Transport},
    extensions::{self, HardlinkExtension, LimitsExtension},
    protocol::{
        codec::PacketReader, Attrs, Data, DirectoryEntry, ExtendedReply, FileAttributes,
        FileTime, FileType, Handle, Name, PacketType, Request, Response, StatusCode, Version,
    },
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub async fn connect(peer: &MockPeer, config: SessionConfig) -> SftpSession<MockPeer> {
    init_logging();
    match SftpSession::connect(peer.clone(), config).await {
        Ok(session) => session,
        Err(error) => panic!("connect failed: {error}"),
    }
}

/// A session on a default version 3 peer.
pub async fn v3() -> (MockPeer, SftpSession<MockPeer>) {
    let peer = MockPeer::new(PeerOptions::default());
    let session = connect(&peer, SessionConfig::default()).await;
    (peer, session)
}

#[derive(Debug, Clone)]
pub struct PeerOptions {
    /// Version sent in `VERSION`
    pub version: u32,
    /// Value of the `versions` extension, if any
    pub versions: Option<String>,
    pub extensions: Vec<(String, String)>,
    pub refuse_subsystem: bool,
    pub accept_exec: bool,
    /// Cut the output into pieces of at most this many bytes
    pub chunk: Option<usize>,
    /// Deliver the responses queued between two reads last-first
    pub reverse: bool,
    /// Never return more than this many bytes per READ
    pub max_read: Option<usize>,
    /// v3 listings without permission bits, leaving the long name to
    /// carry the type
    pub untyped_listing: bool,
    pub server_identifier: Option<String>,
    pub limits: Option<LimitsExtension>,
    pub refuse_version_select: bool,
    /// Paths REMOVE, RMDIR and SETSTAT answer with permission denied
    pub denied: Vec<String>,
    /// Directories OPENDIR answers with permission denied
    pub unlistable: Vec<String>,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            version: 3,
            versions: None,
            extensions: Vec::new(),
            refuse_subsystem: false,
            accept_exec: false,
            chunk: None,
            reverse: false,
            max_read: None,
            untyped_listing: false,
            server_identifier: None,
            limits: None,
            refuse_version_select: false,
            denied: Vec::new(),
            unlistable: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Dir,
    File(Vec<u8>),
    Symlink(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Kind,
    pub permissions: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    /// Sub-second part of `mtime`, only sent from v4
    pub mtime_nanos: Option<u32>,
}

impl Node {
    fn new(kind: Kind) -> Self {
        let permissions = if kind == Kind::Dir { 0o755 } else { 0o644 };
        Self {
            kind,
            permissions,
            uid: 1000,
            gid: 1000,
            atime: 1_700_000_000,
            mtime: 1_700_000_000,
            mtime_nanos: None,
        }
    }

    fn file_type(&self) -> FileType {
        match self.kind {
            Kind::Dir => FileType::Directory,
            Kind::File(_) => FileType::Regular,
            Kind::Symlink(_) => FileType::Symlink,
        }
    }

    fn type_bits(&self) -> u32 {
        match self.kind {
            Kind::Dir => 0o040_000,
            Kind::File(_) => 0o100_000,
            Kind::Symlink(_) => 0o120_000,
        }
    }

    fn attrs(&self, version: u32) -> FileAttributes {
        let size = match &self.kind {
            Kind::File(data) => data.len() as u64,
            Kind::Symlink(target) => target.len() as u64,
            Kind::Dir => 4096,
        };

        let mut attrs = FileAttributes {
            size: Some(size),
            permissions: Some(self.type_bits() | self.permissions),
            atime: Some(FileTime::new(self.atime)),
            mtime: Some(FileTime {
                seconds: self.mtime,
                nanos: self.mtime_nanos.filter(|_| version >= 4),
            }),
            ..Default::default()
        };

        if version <= 3 {
            attrs.uid = Some(self.uid);
            attrs.gid = Some(self.gid);
        } else {
            attrs.file_type = Some(self.file_type());
            attrs.owner = Some(self.uid.to_string());
            attrs.group = Some(self.gid.to_string());
        }

        attrs
    }

    fn apply(&mut self, attrs: &FileAttributes) {
        if let Some(permissions) = attrs.permissions {
            self.permissions = permissions & 0o7777;
        }
        if let (Some(size), Kind::File(data)) = (attrs.size, &mut self.kind) {
            data.resize(size as usize, 0);
        }
        if let Some(uid) = attrs.uid.filter(|uid| *uid != u32::MAX) {
            self.uid = uid;
        }
        if let Some(gid) = attrs.gid.filter(|gid| *gid != u32::MAX) {
            self.gid = gid;
        }
        if let Some(owner) = attrs.owner.as_deref().and_then(|o| o.parse().ok()) {
            self.uid = owner;
        }
        if let Some(group) = attrs.group.as_deref().and_then(|g| g.parse().ok()) {
            self.gid = group;
        }
        if let Some(atime) = attrs.atime {
            self.atime = atime.seconds;
        }
        if let Some(mtime) = attrs.mtime {
            self.mtime = mtime.seconds;
        }
    }
}

enum Open {
    File(String),
    Dir { path: String, listed: bool },
}

pub struct PeerState {
    pub options: PeerOptions,
    pub version: u32,
    pub nodes: BTreeMap<String, Node>,
    pub log: Vec<Request>,
    pub exec_commands: Vec<String>,
    pub closed: bool,
    handles: HashMap<Bytes, Open>,
    next_handle: u32,
    reader: PacketReader,
    queued: Vec<Bytes>,
    outgoing: BytesMut,
}

fn parent(path: &str) -> Option<String> {
    let index = path.rfind('/')?;
    if path == "/" {
        None
    } else if index == 0 {
        Some("/".to_owned())
    } else {
        Some(path[..index].to_owned())
    }
}

fn child_name<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    let rest = if dir == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(dir)?.strip_prefix('/')?
    };

    (!rest.is_empty() && !rest.contains('/')).then_some(rest)
}

fn status(id: u32, code: StatusCode) -> Response {
    Response::status(id, code, &code.to_string())
}

impl PeerState {
    fn new(options: PeerOptions) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), Node::new(Kind::Dir));

        Self {
            version: options.version,
            options,
            nodes,
            log: Vec::new(),
            exec_commands: Vec::new(),
            closed: false,
            handles: HashMap::new(),
            next_handle: 0,
            reader: PacketReader::new(None),
            queued: Vec::new(),
            outgoing: BytesMut::new(),
        }
    }

    fn resolve(path: &str) -> String {
        if path.starts_with('/') {
            normalize(path)
        } else {
            normalize(&format!("/{path}"))
        }
    }

    fn follow(&self, path: &str) -> Option<(String, &Node)> {
        let mut path = path.to_owned();
        for _ in 0..8 {
            let node = self.nodes.get(&path)?;
            match &node.kind {
                Kind::Symlink(target) => {
                    path = if target.starts_with('/') {
                        normalize(target)
                    } else {
                        let dir = parent(&path).unwrap_or_else(|| "/".to_owned());
                        normalize(&format!("{dir}/{target}"))
                    };
                }
                _ => return Some((path, node)),
            }
        }
        None
    }

    fn parent_is_dir(&self, path: &str) -> bool {
        parent(path)
            .and_then(|dir| self.nodes.get(&dir).map(|node| node.kind == Kind::Dir))
            .unwrap_or(false)
    }

    fn children(&self, dir: &str) -> Vec<(String, Node)> {
        self.nodes
            .iter()
            .filter_map(|(path, node)| {
                child_name(dir, path).map(|name| (name.to_owned(), node.clone()))
            })
            .collect()
    }

    fn new_handle(&mut self, open: Open) -> Bytes {
        self.next_handle += 1;
        let handle = Bytes::from(format!("handle-{}", self.next_handle));
        self.handles.insert(handle.clone(), open);
        handle
    }

    fn feed(&mut self, data: &[u8]) -> io::Result<()> {
        self.reader.feed(data);
        while let Some(packet) = self
            .reader
            .next_packet()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        {
            let request = Request::decode(packet, self.version)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let version = self.version;
            let response = self.handle(request.clone());
            self.log.push(request);
            // the version-select reply still goes out in the old version
            self.queued.push(response.to_bytes(version));
        }
        Ok(())
    }

    fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Init(_) => {
                let mut version = Version::new();
                version.version = self.options.version;
                if let Some(versions) = &self.options.versions {
                    version
                        .extensions
                        .insert(extensions::VERSIONS.to_owned(), versions.clone());
                }
                if self.options.limits.is_some() {
                    version
                        .extensions
                        .insert(extensions::LIMITS.to_owned(), "1".to_owned());
                }
                for (name, data) in &self.options.extensions {
                    version.extensions.insert(name.clone(), data.clone());
                }
                Response::Version(version)
            }
            Request::Open(open) => self.open(open.id, &open.filename, open.pflags.bits(), &open.attrs),
            Request::Close(close) => match self.handles.remove(&close.handle) {
                Some(_) => status(close.id, StatusCode::Ok),
                None => status(close.id, StatusCode::InvalidHandle),
            },
            Request::Read(read) => {
                let Some(Open::File(path)) = self.handles.get(&read.handle) else {
                    return status(read.id, StatusCode::InvalidHandle);
                };
                let Some(Node { kind: Kind::File(data), .. }) = self.nodes.get(path) else {
                    return status(read.id, StatusCode::NoSuchFile);
                };

                let offset = read.offset as usize;
                if offset >= data.len() {
                    return status(read.id, StatusCode::Eof);
                }

                let mut len = (read.len as usize).min(data.len() - offset);
                if let Some(max) = self.options.max_read {
                    len = len.min(max);
                }

                Response::Data(Data {
                    id: read.id,
                    data: Bytes::copy_from_slice(&data[offset..offset + len]),
                })
            }
            Request::Write(write) => {
                let Some(Open::File(path)) = self.handles.get(&write.handle) else {
                    return status(write.id, StatusCode::InvalidHandle);
                };
                let Some(Node { kind: Kind::File(data), .. }) = self.nodes.get_mut(path) else {
                    return status(write.id, StatusCode::NoSuchFile);
                };

                let offset = write.offset as usize;
                if data.len() < offset + write.data.len() {
                    data.resize(offset + write.data.len(), 0);
                }
                data[offset..offset + write.data.len()].copy_from_slice(&write.data);
                status(write.id, StatusCode::Ok)
            }
            Request::Stat(stat) => {
                let path = Self::resolve(&stat.path);
                match self.follow(&path) {
                    Some((_, node)) => Response::Attrs(Attrs {
                        id: stat.id,
                        attrs: node.attrs(self.version),
                    }),
                    None => status(stat.id, StatusCode::NoSuchFile),
                }
            }
            Request::Lstat(stat) => match self.nodes.get(&Self::resolve(&stat.path)) {
                Some(node) => Response::Attrs(Attrs {
                    id: stat.id,
                    attrs: node.attrs(self.version),
                }),
                None => status(stat.id, StatusCode::NoSuchFile),
            },
            Request::Fstat(fstat) => {
                let path = match self.handles.get(&fstat.handle) {
                    Some(Open::File(path)) | Some(Open::Dir { path, .. }) => path.clone(),
                    None => return status(fstat.id, StatusCode::InvalidHandle),
                };
                match self.nodes.get(&path) {
                    Some(node) => Response::Attrs(Attrs {
                        id: fstat.id,
                        attrs: node.attrs(self.version),
                    }),
                    None => status(fstat.id, StatusCode::NoSuchFile),
                }
            }
            Request::SetStat(setstat) => {
                let path = Self::resolve(&setstat.path);
                if self.options.denied.contains(&path) {
                    return status(setstat.id, StatusCode::PermissionDenied);
                }
                let target = self.follow(&path).map(|(path, _)| path);
                match target.and_then(|path| self.nodes.get_mut(&path)) {
                    Some(node) => {
                        node.apply(&setstat.attrs);
                        status(setstat.id, StatusCode::Ok)
                    }
                    None => status(setstat.id, StatusCode::NoSuchFile),
                }
            }
            Request::FSetStat(fsetstat) => {
                let path = match self.handles.get(&fsetstat.handle) {
                    Some(Open::File(path)) | Some(Open::Dir { path, .. }) => path.clone(),
                    None => return status(fsetstat.id, StatusCode::InvalidHandle),
                };
                match self.nodes.get_mut(&path) {
                    Some(node) => {
                        node.apply(&fsetstat.attrs);
                        status(fsetstat.id, StatusCode::Ok)
                    }
                    None => status(fsetstat.id, StatusCode::NoSuchFile),
                }
            }
            Request::OpenDir(opendir) => {
                let path = Self::resolve(&opendir.path);
                if self.options.unlistable.contains(&path) {
                    return status(opendir.id, StatusCode::PermissionDenied);
                }
                match self.follow(&path) {
                    Some((path, node)) if node.kind == Kind::Dir => {
                        let handle = self.new_handle(Open::Dir {
                            path,
                            listed: false,
                        });
                        Response::Handle(Handle {
                            id: opendir.id,
                            handle,
                        })
                    }
                    Some(_) => status(opendir.id, StatusCode::NotADirectory),
                    None => status(opendir.id, StatusCode::NoSuchFile),
                }
            }
            Request::ReadDir(readdir) => {
                let dir = match self.handles.get_mut(&readdir.handle) {
                    Some(Open::Dir { listed: true, .. }) => {
                        return status(readdir.id, StatusCode::Eof)
                    }
                    Some(Open::Dir { path, listed }) => {
                        *listed = true;
                        path.clone()
                    }
                    _ => return status(readdir.id, StatusCode::InvalidHandle),
                };

                let mut entries = Vec::new();
                let own = self.nodes.get(&dir).cloned().unwrap_or_else(|| Node::new(Kind::Dir));
                entries.push((".".to_owned(), own.clone()));
                entries.push(("..".to_owned(), own));
                entries.extend(self.children(&dir));

                let files = entries
                    .into_iter()
                    .map(|(name, node)| self.entry(name, &node))
                    .collect();

                Response::Name(Name {
                    id: readdir.id,
                    files,
                })
            }
            Request::Remove(remove) => {
                let path = Self::resolve(&remove.path);
                if self.options.denied.contains(&path) {
                    return status(remove.id, StatusCode::PermissionDenied);
                }
                match self.nodes.get(&path) {
                    Some(node) if node.kind == Kind::Dir => {
                        status(remove.id, StatusCode::FileIsADirectory)
                    }
                    Some(_) => {
                        self.nodes.remove(&path);
                        status(remove.id, StatusCode::Ok)
                    }
                    None => status(remove.id, StatusCode::NoSuchFile),
                }
            }
            Request::MkDir(mkdir) => {
                let path = Self::resolve(&mkdir.path);
                if self.nodes.contains_key(&path) {
                    status(mkdir.id, StatusCode::FileAlreadyExists)
                } else if !self.parent_is_dir(&path) {
                    status(mkdir.id, StatusCode::NoSuchFile)
                } else {
                    let mut node = Node::new(Kind::Dir);
                    node.apply(&mkdir.attrs);
                    self.nodes.insert(path, node);
                    status(mkdir.id, StatusCode::Ok)
                }
            }
            Request::RmDir(rmdir) => {
                let path = Self::resolve(&rmdir.path);
                if self.options.denied.contains(&path) {
                    return status(rmdir.id, StatusCode::PermissionDenied);
                }
                match self.nodes.get(&path) {
                    Some(node) if node.kind != Kind::Dir => {
                        status(rmdir.id, StatusCode::NotADirectory)
                    }
                    Some(_) if !self.children(&path).is_empty() => {
                        status(rmdir.id, StatusCode::DirNotEmpty)
                    }
                    Some(_) => {
                        self.nodes.remove(&path);
                        status(rmdir.id, StatusCode::Ok)
                    }
                    None => status(rmdir.id, StatusCode::NoSuchFile),
                }
            }
            Request::RealPath(realpath) => Response::Name(Name {
                id: realpath.id,
                files: vec![DirectoryEntry::new(
                    Self::resolve(&realpath.path),
                    FileAttributes::default(),
                )],
            }),
            Request::Rename(rename) => {
                let from = Self::resolve(&rename.oldpath);
                let to = Self::resolve(&rename.newpath);
                if !self.nodes.contains_key(&from) {
                    return status(rename.id, StatusCode::NoSuchFile);
                }
                if self.nodes.contains_key(&to) {
                    return status(rename.id, StatusCode::FileAlreadyExists);
                }

                let moved: Vec<String> = self
                    .nodes
                    .keys()
                    .filter(|path| *path == &from || path.starts_with(&format!("{from}/")))
                    .cloned()
                    .collect();
                for path in moved {
                    if let Some(node) = self.nodes.remove(&path) {
                        let renamed = format!("{to}{}", &path[from.len()..]);
                        self.nodes.insert(renamed, node);
                    }
                }
                status(rename.id, StatusCode::Ok)
            }
            Request::ReadLink(readlink) => match self.nodes.get(&Self::resolve(&readlink.path)) {
                Some(Node {
                    kind: Kind::Symlink(target),
                    ..
                }) => Response::Name(Name {
                    id: readlink.id,
                    files: vec![DirectoryEntry::new(target.clone(), FileAttributes::default())],
                }),
                Some(_) => status(readlink.id, StatusCode::InvalidParameter),
                None => status(readlink.id, StatusCode::NoSuchFile),
            },
            Request::Symlink(symlink) => {
                let reversed = self
                    .options
                    .server_identifier
                    .as_deref()
                    .is_some_and(|id| id.starts_with("SSH-2.0-OpenSSH"));
                let (link, target) = if reversed {
                    (symlink.targetpath, symlink.linkpath)
                } else {
                    (symlink.linkpath, symlink.targetpath)
                };
                self.create_link(symlink.id, &link, &target, true)
            }
            Request::Link(link) => self.create_link(
                link.id,
                &link.new_link_path,
                &link.existing_path,
                link.symlink,
            ),
            Request::Extended(extended) => self.extended(extended.id, &extended.request, extended.data),
        }
    }

    fn entry(&self, name: String, node: &Node) -> DirectoryEntry {
        let mut attrs = node.attrs(self.version);
        if self.version <= 3 && self.options.untyped_listing {
            let longname = DirectoryEntry::new(name.clone(), attrs.clone()).format_longname();
            attrs.permissions = None;
            return DirectoryEntry {
                filename: name,
                longname: Some(longname),
                attrs,
            };
        }

        DirectoryEntry::new(name, attrs)
    }

    fn open(&mut self, id: u32, filename: &str, pflags: u32, attrs: &FileAttributes) -> Response {
        let path = Self::resolve(filename);
        let (create, truncate, exclusive) = if self.version >= 5 {
            match pflags & 0x7 {
                0 => (true, false, true),
                1 => (true, true, false),
                2 => (false, false, false),
                3 => (true, false, false),
                _ => (false, true, false),
            }
        } else {
            (pflags & 0x08 != 0, pflags & 0x10 != 0, pflags & 0x20 != 0)
        };

        let target = self.follow(&path).map(|(path, node)| (path, node.kind == Kind::Dir));
        let path = match target {
            Some(_) if exclusive => return status(id, StatusCode::FileAlreadyExists),
            Some((_, true)) => return status(id, StatusCode::FileIsADirectory),
            Some((path, false)) => {
                if truncate {
                    if let Some(node) = self.nodes.get_mut(&path) {
                        node.kind = Kind::File(Vec::new());
                    }
                }
                path
            }
            None if !create => return status(id, StatusCode::NoSuchFile),
            None if !self.parent_is_dir(&path) => return status(id, StatusCode::NoSuchFile),
            None => {
                let mut node = Node::new(Kind::File(Vec::new()));
                node.apply(attrs);
                self.nodes.insert(path.clone(), node);
                path
            }
        };

        let handle = self.new_handle(Open::File(path));
        Response::Handle(Handle { id, handle })
    }

    fn create_link(&mut self, id: u32, link: &str, target: &str, symlink: bool) -> Response {
        let link = Self::resolve(link);
        if self.nodes.contains_key(&link) {
            return status(id, StatusCode::FileAlreadyExists);
        }
        if !self.parent_is_dir(&link) {
            return status(id, StatusCode::NoSuchFile);
        }

        let node = if symlink {
            Node::new(Kind::Symlink(target.to_owned()))
        } else {
            match self.nodes.get(&Self::resolve(target)) {
                Some(node) => node.clone(),
                None => return status(id, StatusCode::NoSuchFile),
            }
        };

        self.nodes.insert(link, node);
        status(id, StatusCode::Ok)
    }

    fn extended(&mut self, id: u32, request: &str, data: Bytes) -> Response {
        match request {
            extensions::VERSION_SELECT => {
                let requested = std::str::from_utf8(data.get(4..).unwrap_or_default())
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok());
                let allowed = self
                    .options
                    .versions
                    .as_deref()
                    .map(extensions::parse_versions)
                    .unwrap_or_default();
                match requested {
                    Some(version)
                        if allowed.contains(&version) && !self.options.refuse_version_select =>
                    {
                        self.version = version;
                        status(id, StatusCode::Ok)
                    }
                    _ => status(id, StatusCode::Failure),
                }
            }
            extensions::LIMITS => match self.options.limits {
                Some(limits) => Response::ExtendedReply(ExtendedReply {
                    id,
                    data: limits.encode(),
                }),
                None => status(id, StatusCode::OpUnsupported),
            },
            extensions::HARDLINK => match HardlinkExtension::decode(data) {
                Ok(link) => self.create_link(id, &link.newpath, &link.oldpath, false),
                Err(_) => status(id, StatusCode::BadMessage),
            },
            _ => status(id, StatusCode::OpUnsupported),
        }
    }

    fn next_output(&mut self) -> Option<Bytes> {
        if self.outgoing.is_empty() {
            let mut queued = std::mem::take(&mut self.queued);
            if self.options.reverse {
                queued.reverse();
            }
            for packet in queued {
                self.outgoing.extend_from_slice(&packet);
            }
        }

        if self.outgoing.is_empty() {
            return None;
        }

        let len = self
            .options
            .chunk
            .map_or(self.outgoing.len(), |chunk| chunk.min(self.outgoing.len()));
        Some(self.outgoing.split_to(len).freeze())
    }
}

/// Handle on the peer, cheap to clone so tests keep one for inspection
/// after the session took the transport.
#[derive(Clone)]
pub struct MockPeer {
    state: Arc<Mutex<PeerState>>,
    identifier: Option<String>,
}

impl MockPeer {
    pub fn new(options: PeerOptions) -> Self {
        Self {
            identifier: options.server_identifier.clone(),
            state: Arc::new(Mutex::new(PeerState::new(options))),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap()
    }

    pub fn add_dir(&self, path: &str) {
        self.state().nodes.insert(path.to_owned(), Node::new(Kind::Dir));
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.state()
            .nodes
            .insert(path.to_owned(), Node::new(Kind::File(data.to_vec())));
    }

    pub fn add_symlink(&self, path: &str, target: &str) {
        self.state()
            .nodes
            .insert(path.to_owned(), Node::new(Kind::Symlink(target.to_owned())));
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state().nodes.get(path).cloned()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().nodes.contains_key(path)
    }

    /// Paths strictly below `dir`.
    pub fn paths_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{dir}/");
        self.state()
            .nodes
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state().log.clone()
    }

    pub fn count(&self, packet_type: PacketType) -> usize {
        self.state()
            .log
            .iter()
            .filter(|request| request.packet_type() == packet_type)
            .count()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }
}

#[async_trait::async_trait]
impl Transport for MockPeer {
    async fn open_channel(&mut self) -> io::Result<ChannelId> {
        Ok(ChannelId(0))
    }

    async fn request_subsystem(&mut self, _channel: ChannelId, name: &str) -> io::Result<bool> {
        Ok(name == "sftp" && !self.state().options.refuse_subsystem)
    }

    async fn exec(&mut self, _channel: ChannelId, command: &str) -> io::Result<bool> {
        let mut state = self.state();
        state.exec_commands.push(command.to_owned());
        Ok(state.options.accept_exec)
    }

    async fn send(&mut self, _channel: ChannelId, data: &[u8]) -> io::Result<bool> {
        let mut state = self.state();
        if state.closed {
            return Ok(false);
        }
        state.feed(data)?;
        Ok(true)
    }

    async fn receive(&mut self, _channel: ChannelId) -> io::Result<Received> {
        let mut state = self.state();
        if state.closed {
            return Ok(Received::Closed);
        }
        Ok(state
            .next_output()
            .map_or(Received::Timeout, Received::Data))
    }

    async fn close_channel(&mut self, _channel: ChannelId) -> io::Result<()> {
        self.state().closed = true;
        Ok(())
    }

    fn server_identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }
}
