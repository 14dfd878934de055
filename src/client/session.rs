use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::BTreeMap,
    io::SeekFrom,
    path::{Path as LocalPath, PathBuf},
    time::Duration,
};
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};

use super::{
    cache::StatCache,
    config::SessionConfig,
    error::{Error, SftpResult},
    fs::{ListOrder, Metadata},
    negotiator::{Negotiated, Negotiator, SessionState},
    path::{self, PathResolver},
    pipeline::{Batch, BatchOutcome},
    rawsession::{into_status, into_with_status, RawSftpSession},
    transport::Transport,
};
use crate::{
    extensions,
    protocol::{
        DirectoryEntry, Disposition, FileAttributes, FileTime, FileType, Open, OpenFlags, Path,
        PathAttrs, Read, Request, Response, Status, StatusCode, Write,
    },
    utils,
};

/// Server handle of an open file or directory. Closing consumes it.
struct OpenHandle(Bytes);

impl OpenHandle {
    fn bytes(&self) -> Bytes {
        self.0.clone()
    }
}

/// Where [`SftpSession::put`] takes its data from.
pub enum PutSource {
    Bytes(Bytes),
    LocalFile(PathBuf),
    Reader(Box<dyn AsyncRead + Unpin + Send>),
}

impl From<Bytes> for PutSource {
    fn from(data: Bytes) -> Self {
        Self::Bytes(data)
    }
}

impl From<Vec<u8>> for PutSource {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(data))
    }
}

impl From<&'static [u8]> for PutSource {
    fn from(data: &'static [u8]) -> Self {
        Self::Bytes(Bytes::from_static(data))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutMode(u32);

bitflags! {
    impl PutMode: u32 {
        /// Continue at the remote size, skipping as much of the source
        const RESUME = 0x0000_0001;
        /// Append the whole source at the remote size
        const RESUME_START = 0x0000_0002;
    }
}

/// `start` and `local_start` take precedence over the resume modes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    pub mode: PutMode,
    /// Remote offset of the first byte written
    pub start: Option<u64>,
    /// Bytes of the source to skip
    pub local_start: Option<u64>,
}

impl From<PutMode> for PutOptions {
    fn from(mode: PutMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }
}

/// Owner or group for [`SftpSession::chown`] and [`SftpSession::chgrp`].
/// Version 3 only knows numeric ids, later versions only names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Id(u32),
    Name(String),
}

impl Principal {
    fn id(&self) -> SftpResult<u32> {
        match self {
            Self::Id(id) => Ok(*id),
            Self::Name(name) => name.parse().map_err(|_| {
                Status::new(
                    0,
                    StatusCode::InvalidParameter,
                    &format!("{name} is not a numeric id"),
                )
                .into()
            }),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

/// Step of a subtree walk: list a directory, or act on one path.
enum Work {
    Visit(String),
    Apply(String),
}

/// High-level SFTP implementation for easy interaction with a remote file system.
/// Contains most methods similar to the native [filesystem](std::fs)
///
/// Paths are resolved against the working directory before anything is
/// sent, and `stat`/`lstat` answers are kept in a cache that every
/// mutating operation invalidates.
pub struct SftpSession<T: Transport> {
    raw: RawSftpSession<T>,
    config: SessionConfig,
    negotiated: Negotiated,
    resolver: PathResolver,
    cache: StatCache,
    list_order: ListOrder,
    symlink_reversed: bool,
    state: SessionState,
}

impl<T: Transport> SftpSession<T> {
    /// Opens the `sftp` channel, negotiates the version and resolves the
    /// working directory.
    pub async fn connect(transport: T, config: SessionConfig) -> SftpResult<Self> {
        let mut negotiator = Negotiator::new(&config);
        let (mut raw, mut negotiated) = negotiator.connect(transport).await?;
        negotiator.resolve_pwd(&mut raw, &mut negotiated).await?;
        let state = negotiator.state();

        if negotiated.extensions.contains_key(extensions::LIMITS) {
            match raw.limits_extension().await {
                Ok(limits) => {
                    debug!("server limits {limits:?}");
                    raw.set_limits(limits.into());
                }
                Err(error) if error.is_transport() => return Err(error),
                Err(error) => warn!("{} query failed: {error}", extensions::LIMITS),
            }
        }

        let symlink_reversed = raw
            .transport()
            .server_identifier()
            .is_some_and(|id| id.starts_with("SSH-2.0-OpenSSH"));

        let resolver = match &negotiated.pwd {
            Some(pwd) => PathResolver::canonical(pwd.clone()),
            None => PathResolver::emulated(),
        };

        Ok(Self {
            raw,
            cache: StatCache::new(config.stat_cache),
            config,
            negotiated,
            resolver,
            list_order: ListOrder::None,
            symlink_reversed,
            state,
        })
    }

    /// `Failed` once the channel is lost, `Closed` after [`close`](Self::close).
    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Ready if !self.raw.is_connected() => SessionState::Failed,
            state => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.raw.is_connected()
    }

    /// Closes the channel and forgets everything cached.
    pub async fn close(&mut self) -> SftpResult<()> {
        self.cache.clear();
        self.state = SessionState::Closed;
        self.raw.close_session().await
    }

    pub fn negotiated_version(&self) -> u32 {
        self.raw.version()
    }

    /// Version the server answered `INIT` with.
    pub fn server_version(&self) -> u32 {
        self.negotiated.server_version
    }

    /// Versions listed in the server's `versions` extension.
    pub fn supported_versions(&self) -> &[u32] {
        &self.negotiated.supported_versions
    }

    pub fn extensions(&self) -> &BTreeMap<String, String> {
        &self.negotiated.extensions
    }

    /// Set the maximum time to wait for each incoming packet.
    /// Default: 10 seconds
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
        self.raw.set_timeout(timeout);
    }

    pub fn set_list_order(&mut self, order: ListOrder) {
        self.list_order = order;
    }

    pub fn enable_stat_cache(&mut self) {
        self.config.stat_cache = true;
        self.cache.enable();
    }

    pub fn disable_stat_cache(&mut self) {
        self.config.stat_cache = false;
        self.cache.disable();
    }

    pub fn clear_stat_cache(&mut self) {
        self.cache.clear();
    }

    pub fn enable_arbitrary_length_packets(&mut self) {
        self.config.allow_arbitrary_length_packets = true;
        self.raw.set_max_packet_len(None);
    }

    pub fn disable_arbitrary_length_packets(&mut self) {
        self.config.allow_arbitrary_length_packets = false;
        self.raw.set_max_packet_len(Some(self.config.max_packet_len));
    }

    pub fn enable_date_preservation(&mut self) {
        self.config.preserve_time = true;
    }

    pub fn disable_date_preservation(&mut self) {
        self.config.preserve_time = false;
    }

    /// Switches to server side canonicalization, asking the server for the
    /// absolute form of the current working directory.
    pub async fn enable_path_canonicalization(&mut self) -> SftpResult<()> {
        if self.resolver.is_canonical() {
            return Ok(());
        }

        let pwd = self.canonicalize(self.resolver.pwd().to_owned()).await?;
        self.resolver.set_pwd(pwd);
        self.resolver.set_canonical(true);
        self.config.canonicalize_paths = true;
        Ok(())
    }

    pub fn disable_path_canonicalization(&mut self) {
        self.resolver.set_canonical(false);
        self.config.canonicalize_paths = false;
    }

    pub fn pwd(&self) -> &str {
        self.resolver.pwd()
    }

    fn resolve(&self, path: &str) -> String {
        self.resolver.resolve(path)
    }

    async fn canonicalize(&mut self, path: String) -> SftpResult<String> {
        let name = self.raw.realpath(path).await?;
        match <[DirectoryEntry; 1]>::try_from(name.files) {
            Ok([file]) => Ok(file.filename),
            Err(files) => Err(Error::UnexpectedBehavior(format!(
                "REALPATH returned {} names",
                files.len()
            ))),
        }
    }

    /// Absolute form of `path`. Asks the server when canonicalization is
    /// on, otherwise resolves it locally.
    pub async fn realpath<P: Into<String>>(&mut self, path: P) -> SftpResult<String> {
        let path = self.resolve(&path.into());
        if self.resolver.is_canonical() {
            self.canonicalize(path).await
        } else {
            Ok(path)
        }
    }

    /// Changes the working directory after checking that `dir` can be
    /// opened as a directory.
    pub async fn chdir<P: Into<String>>(&mut self, dir: P) -> SftpResult<()> {
        let dir = self.realpath(dir).await?;

        if !self.cache.is_dir(&dir) {
            let handle = self.open_dir(&dir).await?;
            self.close_handle(handle).await?;
            self.cache.mark_directory(&dir);
        }

        debug!("working directory is now {dir}");
        self.resolver.set_pwd(dir);
        Ok(())
    }

    async fn open_dir(&mut self, dir: &str) -> SftpResult<OpenHandle> {
        Ok(OpenHandle(self.raw.opendir(dir).await?.handle))
    }

    async fn open_file(
        &mut self,
        path: &str,
        pflags: OpenFlags,
        desired_access: u32,
        attrs: FileAttributes,
    ) -> SftpResult<OpenHandle> {
        Ok(OpenHandle(
            self.raw
                .open(path, pflags, desired_access, attrs)
                .await?
                .handle,
        ))
    }

    async fn close_handle(&mut self, handle: OpenHandle) -> SftpResult<()> {
        self.raw.close(handle.0).await
    }

    /// Closes `handle` whatever `result` is. A close failure only wins
    /// over a successful result.
    async fn finish<R>(&mut self, handle: OpenHandle, result: SftpResult<R>) -> SftpResult<R> {
        let closed = self.close_handle(handle).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(close_error)) => {
                warn!("failed to close handle after error: {close_error}");
                Err(error)
            }
        }
    }

    /// Whether `path` is a directory, found by trying to open it as one.
    async fn probe_type(&mut self, path: &str) -> SftpResult<FileType> {
        match self.raw.opendir(path).await {
            Ok(handle) => {
                self.close_handle(OpenHandle(handle.handle)).await?;
                Ok(FileType::Directory)
            }
            Err(error) if error.is_transport() => Err(error),
            Err(_) => Ok(FileType::Regular),
        }
    }

    /// Queries metadata about the remote file, following symlinks.
    pub async fn stat<P: Into<String>>(&mut self, path: P) -> SftpResult<Metadata> {
        let path = self.resolve(&path.into());
        if let Some(attrs) = self.cache.stat(&path) {
            return Ok(attrs);
        }

        let mut attrs = self.raw.stat(path.as_str()).await?.attrs;
        if attrs.file_type().is_none() {
            attrs.file_type = Some(self.probe_type(&path).await?);
        }

        self.cache.put_stat(&path, attrs.clone());
        Ok(attrs)
    }

    /// Queries metadata about the remote file without following a final
    /// symlink.
    pub async fn lstat<P: Into<String>>(&mut self, path: P) -> SftpResult<Metadata> {
        let path = self.resolve(&path.into());
        if let Some(attrs) = self.cache.lstat(&path) {
            return Ok(attrs);
        }

        let mut attrs = self.raw.lstat(path.as_str()).await?.attrs;
        if attrs.file_type().is_none() {
            // a symlink is the one thing STAT and LSTAT disagree on
            let file_type = match self.raw.stat(path.as_str()).await {
                Ok(stat) if stat.attrs != attrs => FileType::Symlink,
                Ok(_) => self.probe_type(&path).await?,
                Err(error) if error.is_transport() => return Err(error),
                Err(_) => FileType::Symlink,
            };
            attrs.file_type = Some(file_type);
        }

        self.cache.put_lstat(&path, attrs.clone());
        Ok(attrs)
    }

    async fn exists_as<P, F>(&mut self, path: P, follow: bool, check: F) -> SftpResult<bool>
    where
        P: Into<String>,
        F: FnOnce(&Metadata) -> bool,
    {
        let result = if follow {
            self.stat(path).await
        } else {
            self.lstat(path).await
        };

        match result {
            Ok(attrs) => Ok(check(&attrs)),
            Err(error)
                if error.is_status(StatusCode::NoSuchFile)
                    || error.is_status(StatusCode::NoSuchPath) =>
            {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    /// Checks a file or folder exists at the specified path
    pub async fn file_exists<P: Into<String>>(&mut self, path: P) -> SftpResult<bool> {
        self.exists_as(path, true, |_| true).await
    }

    pub async fn is_dir<P: Into<String>>(&mut self, path: P) -> SftpResult<bool> {
        self.exists_as(path, true, Metadata::is_dir).await
    }

    pub async fn is_file<P: Into<String>>(&mut self, path: P) -> SftpResult<bool> {
        self.exists_as(path, true, Metadata::is_regular).await
    }

    pub async fn is_link<P: Into<String>>(&mut self, path: P) -> SftpResult<bool> {
        self.exists_as(path, false, Metadata::is_symlink).await
    }

    pub async fn size<P: Into<String>>(&mut self, path: P) -> SftpResult<u64> {
        let path = path.into();
        self.stat(path.as_str())
            .await?
            .size
            .ok_or_else(|| Error::UnexpectedBehavior(format!("no size reported for {path}")))
    }

    /// Every entry of a resolved directory, in server order.
    async fn read_dir(&mut self, dir: &str) -> SftpResult<Vec<DirectoryEntry>> {
        let handle = self.open_dir(dir).await?;
        let mut entries = Vec::new();

        // the server decides how many entries one NAME reply carries
        self.raw.set_max_packet_len(None);
        let result = loop {
            match self.raw.readdir(handle.bytes()).await {
                Ok(name) => entries.extend(name.files),
                Err(error) if error.is_status(StatusCode::Eof) => break Ok(()),
                Err(error) => break Err(error),
            }
        };
        self.raw.set_max_packet_len(self.config.packet_limit());

        self.finish(handle, result).await?;
        self.cache.put_listing(dir, &entries);
        Ok(entries)
    }

    /// Returns the entries of a directory, `.` and `..` included when the
    /// server sends them.
    pub async fn list<P: Into<String>>(&mut self, path: P) -> SftpResult<Vec<DirectoryEntry>> {
        let dir = self.resolve(&path.into());
        let mut entries = self.read_dir(&dir).await?;
        self.list_order.sort(&mut entries);
        Ok(entries)
    }

    /// Lists a whole tree. Names are relative to `path`; `.` and `..` only
    /// appear for `path` itself. Subdirectories that can not be read are
    /// left out.
    pub async fn list_recursive<P: Into<String>>(
        &mut self,
        path: P,
    ) -> SftpResult<Vec<DirectoryEntry>> {
        let root = self.resolve(&path.into());
        let mut listing = Vec::new();
        let mut stack = vec![(root, String::new())];

        while let Some((dir, prefix)) = stack.pop() {
            let top = prefix.is_empty();
            let mut entries = match self.read_dir(&dir).await {
                Ok(entries) => entries,
                Err(error) if top || error.is_transport() => return Err(error),
                Err(error) => {
                    warn!("skipping {dir}: {error}");
                    continue;
                }
            };
            self.list_order.sort(&mut entries);

            let mut subdirs = Vec::new();
            for mut entry in entries {
                let dots = entry.filename == "." || entry.filename == "..";
                if dots && !top {
                    continue;
                }

                if !dots && entry.attrs.is_dir() {
                    subdirs.push((
                        path::join(&dir, &entry.filename),
                        format!("{prefix}{}/", entry.filename),
                    ));
                }

                entry.filename = format!("{prefix}{}", entry.filename);
                listing.push(entry);
            }

            stack.extend(subdirs.into_iter().rev());
        }

        Ok(listing)
    }

    /// Names only, see [`list`](Self::list) and
    /// [`list_recursive`](Self::list_recursive).
    pub async fn nlist<P: Into<String>>(&mut self, path: P, recursive: bool) -> SftpResult<Vec<String>> {
        let entries = if recursive {
            self.list_recursive(path).await?
        } else {
            self.list(path).await?
        };

        Ok(entries.into_iter().map(|entry| entry.filename).collect())
    }

    fn read_flags(&self) -> (OpenFlags, u32) {
        if self.raw.version() >= 5 {
            (Disposition::OpenExisting.flags(), Open::ACE4_READ_DATA)
        } else {
            (OpenFlags::READ, 0)
        }
    }

    fn read_chunk_len(&self) -> u32 {
        let len = u64::from(self.config.max_transfer_len.max(1));
        let len = self.raw.limits().read_len.map_or(len, |limit| len.min(limit));
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    /// Reads from `start` until `length` bytes were delivered or the file
    /// ends, with up to a download window of READs outstanding. Returns the
    /// number of bytes written to `sink`.
    async fn read_pipelined<W>(
        &mut self,
        handle: &OpenHandle,
        start: u64,
        length: Option<u64>,
        sink: &mut W,
    ) -> SftpResult<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let chunk = self.read_chunk_len();
        let end = length.map(|length| start.saturating_add(length));
        let mut next_offset = start;
        let mut written = 0u64;

        loop {
            let mut batch = Batch::new(self.config.windows.download);
            while !batch.is_full() && end.map_or(true, |end| next_offset < end) {
                let len = end.map_or(chunk, |end| {
                    u32::try_from((end - next_offset).min(u64::from(chunk))).unwrap_or(chunk)
                });
                let offset = next_offset;
                let handle = handle.bytes();
                batch
                    .submit(&mut self.raw, (offset, len), |id| {
                        Request::Read(Read {
                            id,
                            handle,
                            offset,
                            len,
                        })
                    })
                    .await?;
                next_offset += u64::from(len);
            }

            if batch.is_empty() {
                return Ok(written);
            }

            let mut eof = false;
            let mut restart = None;
            let mut failure = None;

            for ((offset, len), result) in batch.drain(&mut self.raw).await {
                if eof || restart.is_some() || failure.is_some() {
                    continue;
                }

                match result.and_then(|response| into_with_status!(response, Data)) {
                    Ok(data) if data.data.is_empty() => eof = true,
                    Ok(data) => {
                        sink.write_all(&data.data).await?;
                        written += data.data.len() as u64;
                        if (data.data.len() as u64) < u64::from(len) {
                            restart = Some(offset + data.data.len() as u64);
                        }
                    }
                    Err(error) if error.is_status(StatusCode::Eof) => eof = true,
                    Err(error) => failure = Some(error),
                }
            }

            if let Some(error) = failure {
                return Err(partial(written, error));
            }

            if eof {
                return Ok(written);
            }

            if let Some(offset) = restart {
                trace!("short read, continuing at {offset}");
                next_offset = offset;
            }
        }
    }

    /// Downloads a whole file into memory.
    pub async fn get<P: Into<String>>(&mut self, path: P) -> SftpResult<Bytes> {
        self.get_range(path, 0, None).await
    }

    /// Downloads `length` bytes from `offset`, or up to the end of the file
    /// when `length` is `None`.
    pub async fn get_range<P: Into<String>>(
        &mut self,
        path: P,
        offset: u64,
        length: Option<u64>,
    ) -> SftpResult<Bytes> {
        let path = self.resolve(&path.into());
        let (pflags, access) = self.read_flags();
        let handle = self
            .open_file(&path, pflags, access, FileAttributes::default())
            .await?;

        let mut buffer = Vec::new();
        let result = self
            .read_pipelined(&handle, offset, length, &mut buffer)
            .await;
        self.finish(handle, result).await?;

        Ok(Bytes::from(buffer))
    }

    /// Downloads a file to `local_path`, returning the number of bytes
    /// written. With date preservation on, the local file gets the remote
    /// modification time.
    pub async fn download<P, L>(&mut self, path: P, local_path: L) -> SftpResult<u64>
    where
        P: Into<String>,
        L: AsRef<LocalPath>,
    {
        let path = self.resolve(&path.into());
        let (pflags, access) = self.read_flags();
        let handle = self
            .open_file(&path, pflags, access, FileAttributes::default())
            .await?;

        let result = match tokio::fs::File::create(local_path.as_ref()).await {
            Ok(mut file) => {
                let result = self.read_pipelined(&handle, 0, None, &mut file).await;
                match result {
                    Ok(written) => self.finish_download(&handle, file, written).await,
                    Err(error) => Err(error),
                }
            }
            Err(error) => Err(error.into()),
        };

        self.finish(handle, result).await
    }

    async fn finish_download(
        &mut self,
        handle: &OpenHandle,
        mut file: tokio::fs::File,
        written: u64,
    ) -> SftpResult<u64> {
        file.flush().await?;

        if self.config.preserve_time {
            let attrs = self.raw.fstat(handle.bytes()).await?.attrs;
            if let Some(mtime) = attrs.mtime {
                if mtime.to_system_time().is_none() {
                    return Err(Error::UnexpectedBehavior(format!(
                        "server sent an unrepresentable modification time {}",
                        mtime.seconds
                    )));
                }
                utils::set_local_mtime(file, mtime).await?;
            }
        }

        Ok(written)
    }

    /// Uploads `source` to `path`, truncating it first unless `mode` asks
    /// to resume. Returns the number of bytes written.
    pub async fn put<P, S>(&mut self, path: P, source: S, mode: PutMode) -> SftpResult<u64>
    where
        P: Into<String>,
        S: Into<PutSource>,
    {
        self.put_with(path, source.into(), mode.into()).await
    }

    /// Uploads with explicit offsets.
    ///
    /// The remote offset is `start`, else the current remote size for the
    /// resume modes, else zero with the file truncated. The source is read
    /// from `local_start`, else from the remote offset for
    /// [`PutMode::RESUME`], else from its beginning.
    ///
    /// A failure after some writes were acknowledged is returned as
    /// [`Error::Partial`].
    pub async fn put_with<P: Into<String>>(
        &mut self,
        path: P,
        source: PutSource,
        options: PutOptions,
    ) -> SftpResult<u64> {
        let path = self.resolve(&path.into());
        self.cache.invalidate(&path);

        let resume = options
            .mode
            .intersects(PutMode::RESUME | PutMode::RESUME_START);
        let truncate = options.start.is_none() && !resume;

        let (pflags, access) = match (self.raw.version() >= 5, truncate) {
            (true, true) => (Disposition::CreateTruncate.flags(), Open::ACE4_WRITE_DATA),
            (true, false) => (Disposition::OpenOrCreate.flags(), Open::ACE4_WRITE_DATA),
            (false, true) => (
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                0,
            ),
            (false, false) => (OpenFlags::WRITE | OpenFlags::CREATE, 0),
        };

        let local_file = match &source {
            PutSource::LocalFile(local) => Some(local.clone()),
            _ => None,
        };

        let handle = self
            .open_file(&path, pflags, access, FileAttributes::default())
            .await?;

        let result = self.upload(&handle, source, options).await;
        let result = self.finish(handle, result).await;

        self.cache.invalidate(&path);
        self.cache.invalidate_parent_of(&path);
        let written = result?;

        if let (true, Some(local)) = (self.config.preserve_time, local_file) {
            let (atime, mtime) = utils::local_times(&local).await?;
            let attrs = FileAttributes {
                atime: Some(atime),
                mtime: Some(mtime),
                ..Default::default()
            };
            self.raw.setstat(path.as_str(), attrs).await?;
        }

        Ok(written)
    }

    async fn upload(
        &mut self,
        handle: &OpenHandle,
        source: PutSource,
        options: PutOptions,
    ) -> SftpResult<u64> {
        let offset = match options.start {
            Some(start) => start,
            None if options
                .mode
                .intersects(PutMode::RESUME | PutMode::RESUME_START) =>
            {
                self.raw.fstat(handle.bytes()).await?.attrs.len()
            }
            None => 0,
        };

        let skip = match options.local_start {
            Some(local_start) => local_start,
            None if options.mode.contains(PutMode::RESUME) => offset,
            None => 0,
        };

        let mut reader: Box<dyn AsyncRead + Unpin + Send> = match source {
            PutSource::Bytes(data) => {
                let skip = usize::try_from(skip).unwrap_or(usize::MAX).min(data.len());
                Box::new(std::io::Cursor::new(data.slice(skip..)))
            }
            PutSource::LocalFile(local) => {
                let mut file = tokio::fs::File::open(local).await?;
                let _ = file.seek(SeekFrom::Start(skip)).await?;
                Box::new(file)
            }
            PutSource::Reader(mut reader) => {
                let _ = utils::skip(&mut reader, skip).await?;
                reader
            }
        };

        self.write_pipelined(handle, offset, &mut reader).await
    }

    fn write_chunk_len(&self, handle: &OpenHandle) -> usize {
        // the WRITE header is part of the budget
        let overhead = handle.0.len() + 25;
        let len = (self.config.max_transfer_len as usize)
            .saturating_sub(overhead)
            .max(1);
        self.raw
            .limits()
            .write_len
            .map_or(len, |limit| len.min(usize::try_from(limit).unwrap_or(usize::MAX)))
    }

    async fn write_pipelined<R>(
        &mut self,
        handle: &OpenHandle,
        offset: u64,
        reader: &mut R,
    ) -> SftpResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let chunk = self.write_chunk_len(handle);
        let mut batch = Batch::new(self.config.windows.upload);
        let mut sent = 0u64;
        let mut confirmed = 0u64;
        let mut failure = None;

        loop {
            let data = match utils::read_chunk(reader, chunk).await {
                Ok(data) if data.is_empty() => break,
                Ok(data) => data,
                Err(error) => {
                    failure = Some(Error::from(error));
                    break;
                }
            };

            let len = data.len() as u64;
            let write_offset = offset + sent;
            let handle = handle.bytes();
            let submitted = batch
                .submit(&mut self.raw, len, |id| {
                    Request::Write(Write {
                        id,
                        handle,
                        offset: write_offset,
                        data,
                    })
                })
                .await;

            if let Err(error) = submitted {
                failure = Some(error);
                break;
            }
            sent += len;

            if batch.is_full() {
                if let Err(error) = self.drain_writes(&mut batch, &mut confirmed).await {
                    failure = Some(error);
                    break;
                }
            }
        }

        // whatever went wrong, acknowledged writes still have to be read
        if let Err(error) = self.drain_writes(&mut batch, &mut confirmed).await {
            failure.get_or_insert(error);
        }

        match failure {
            None => Ok(confirmed),
            Some(error) => Err(partial(confirmed, error)),
        }
    }

    async fn drain_writes(&mut self, batch: &mut Batch<u64>, confirmed: &mut u64) -> SftpResult<()> {
        let mut first = None;
        for (len, result) in batch.drain(&mut self.raw).await {
            match result.and_then(|response| into_status!(response)) {
                Ok(()) => *confirmed += len,
                Err(error) => {
                    first.get_or_insert(error);
                }
            }
        }

        first.map_or(Ok(()), Err)
    }

    /// Collects the status of every queued per-path request. Transport
    /// failures end the walk right away.
    async fn drain_statuses(
        &mut self,
        batch: &mut Batch<String>,
        outcome: &mut BatchOutcome,
    ) -> SftpResult<()> {
        for (path, result) in batch.drain(&mut self.raw).await {
            let result = result.and_then(|response| into_status!(response));
            match &result {
                Err(error) if error.is_transport() => return Err(error.clone()),
                Ok(()) => self.cache.invalidate_subtree(&path),
                Err(_) => {}
            }
            outcome.record(result);
        }

        Ok(())
    }

    /// Removes a file, or with `recursive` a whole directory tree.
    ///
    /// Entries that can not be removed do not stop the walk; they are
    /// reported together as [`Error::Batch`]. Directories that can not be
    /// listed are treated as empty.
    pub async fn delete<P: Into<String>>(&mut self, path: P, recursive: bool) -> SftpResult<()> {
        let path = self.resolve(&path.into());

        let removed = self.raw.remove(path.as_str()).await;
        self.cache.invalidate(&path);

        let remove_error = match removed {
            Ok(()) => {
                self.cache.invalidate_subtree(&path);
                self.cache.invalidate_parent_of(&path);
                return Ok(());
            }
            Err(error) if !recursive || error.is_transport() => return Err(error),
            Err(error) => error,
        };

        let result = self.delete_tree(&path, remove_error).await;
        self.cache.invalidate_subtree(&path);
        self.cache.invalidate_parent_of(&path);
        result
    }

    async fn delete_tree(&mut self, root: &str, remove_error: Error) -> SftpResult<()> {
        let mut outcome = BatchOutcome::default();
        let mut batch = Batch::new(self.config.windows.batch);
        let mut stack = vec![Work::Visit(root.to_owned())];

        while let Some(work) = stack.pop() {
            match work {
                Work::Visit(dir) => {
                    let entries = match self.read_dir(&dir).await {
                        Ok(entries) => entries,
                        Err(error) if error.is_transport() => return Err(error),
                        Err(error) if dir == root && !error.is_status(StatusCode::PermissionDenied) => {
                            debug!("{root} is not a listable directory: {error}");
                            return Err(remove_error);
                        }
                        Err(error) => {
                            warn!("can not list {dir} ({error}), treating it as empty");
                            Vec::new()
                        }
                    };

                    stack.push(Work::Apply(dir.clone()));
                    for entry in entries {
                        if entry.filename == "." || entry.filename == ".." {
                            continue;
                        }

                        let child = path::join(&dir, &entry.filename);
                        if entry.attrs.is_dir() {
                            stack.push(Work::Visit(child));
                            continue;
                        }

                        let target = child.clone();
                        batch
                            .submit(&mut self.raw, child, |id| {
                                Request::Remove(Path { id, path: target })
                            })
                            .await?;

                        if batch.is_full() {
                            self.drain_statuses(&mut batch, &mut outcome).await?;
                        }
                    }
                }
                Work::Apply(dir) => {
                    // the directory has to be empty before RMDIR goes out
                    self.drain_statuses(&mut batch, &mut outcome).await?;

                    let result = self.raw.rmdir(dir.as_str()).await;
                    match result {
                        Err(error) if error.is_transport() => return Err(error),
                        result => {
                            self.cache.invalidate_subtree(&dir);
                            outcome.record(result);
                        }
                    }
                }
            }
        }

        self.drain_statuses(&mut batch, &mut outcome).await?;
        outcome.into_result()
    }

    /// Removes an empty directory.
    pub async fn rmdir<P: Into<String>>(&mut self, path: P) -> SftpResult<()> {
        let path = self.resolve(&path.into());
        let result = self.raw.rmdir(path.as_str()).await;
        self.cache.invalidate_subtree(&path);
        self.cache.invalidate_parent_of(&path);
        result
    }

    /// Rename a file or directory to a new name.
    pub async fn rename<O, N>(&mut self, oldpath: O, newpath: N) -> SftpResult<()>
    where
        O: Into<String>,
        N: Into<String>,
    {
        let oldpath = self.resolve(&oldpath.into());
        let newpath = self.resolve(&newpath.into());

        let result = self
            .raw
            .rename(oldpath.as_str(), newpath.as_str(), 0)
            .await;

        for path in [&oldpath, &newpath] {
            self.cache.invalidate_subtree(path);
            self.cache.invalidate_parent_of(path);
        }

        result
    }

    /// Creates a directory, optionally with `mode` applied afterwards.
    ///
    /// With `recursive` every missing parent is created first. Failures on
    /// the way (usually because a parent already exists) are ignored and
    /// the result for `path` itself is returned.
    pub async fn mkdir<P: Into<String>>(
        &mut self,
        path: P,
        mode: Option<u32>,
        recursive: bool,
    ) -> SftpResult<()> {
        let path = self.resolve(&path.into());
        if !recursive {
            return self.mkdir_one(&path, mode).await;
        }

        let prefixes = prefixes(&path);
        let Some(last) = prefixes.len().checked_sub(1) else {
            return self.mkdir_one(&path, mode).await;
        };

        let mut result = Ok(());
        for (index, dir) in prefixes.iter().enumerate() {
            if index < last && self.cache.is_dir(dir) {
                continue;
            }

            result = match self.mkdir_one(dir, mode).await {
                Err(error) if error.is_transport() => return Err(error),
                Err(error) if index < last => {
                    if error.is_status(StatusCode::FileAlreadyExists) {
                        debug!("mkdir {dir}: {error}");
                    } else {
                        warn!("mkdir {dir}: {error}, continuing");
                    }
                    Err(error)
                }
                other => other,
            };
        }

        result
    }

    async fn mkdir_one(&mut self, dir: &str, mode: Option<u32>) -> SftpResult<()> {
        let result = self.raw.mkdir(dir, FileAttributes::default()).await;
        self.cache.invalidate(dir);
        self.cache.invalidate_parent_of(dir);
        result?;

        self.cache.mark_directory(dir);
        if let Some(mode) = mode {
            self.raw.setstat(dir, permissions(mode)).await?;
        }

        Ok(())
    }

    /// Reads a symbolic link, returning the file that the link points to.
    pub async fn readlink<P: Into<String>>(&mut self, path: P) -> SftpResult<String> {
        let path = self.resolve(&path.into());
        let name = self.raw.readlink(path.as_str()).await?;
        match name.files.into_iter().next() {
            Some(file) => Ok(file.filename),
            None => Err(Error::UnexpectedBehavior(format!(
                "READLINK {path} returned no name"
            ))),
        }
    }

    /// Creates `link` pointing at `target`. The target is sent as given.
    pub async fn symlink<P, L>(&mut self, target: P, link: L) -> SftpResult<()>
    where
        P: Into<String>,
        L: Into<String>,
    {
        let target = target.into();
        let link = self.resolve(&link.into());

        let result = if self.raw.version() >= 6 {
            self.raw.link(link.as_str(), target, true).await
        } else if self.symlink_reversed {
            // OpenSSH reads the two paths of SYMLINK the other way round
            self.raw.symlink(target, link.as_str()).await
        } else {
            self.raw.symlink(link.as_str(), target).await
        };

        self.cache.invalidate(&link);
        self.cache.invalidate_parent_of(&link);
        result
    }

    /// Creates a hard link through `LINK` on version 6 or the
    /// `hardlink@openssh.com` extension.
    pub async fn hardlink<P, L>(&mut self, target: P, link: L) -> SftpResult<()>
    where
        P: Into<String>,
        L: Into<String>,
    {
        let target = self.resolve(&target.into());
        let link = self.resolve(&link.into());

        let result = if self.raw.version() >= 6 {
            self.raw.link(link.as_str(), target.as_str(), false).await
        } else if self.negotiated.extensions.contains_key(extensions::HARDLINK) {
            self.raw.hardlink(target.as_str(), link.as_str()).await
        } else {
            Err(Status::new(0, StatusCode::OpUnsupported, "hard links are not supported").into())
        };

        self.cache.invalidate(&link);
        self.cache.invalidate_parent_of(&link);
        result
    }

    /// Sets attributes of `path`, or with `recursive` of everything below
    /// it. Symlinks met on the way are left alone.
    pub async fn setstat<P: Into<String>>(
        &mut self,
        path: P,
        attrs: FileAttributes,
        recursive: bool,
    ) -> SftpResult<()> {
        let path = self.resolve(&path.into());
        self.cache.invalidate(&path);

        if !recursive {
            return self.raw.setstat(path.as_str(), attrs).await;
        }

        let result = self.setstat_tree(&path, &attrs).await;
        self.cache.invalidate_subtree(&path);
        result
    }

    async fn setstat_tree(&mut self, root: &str, attrs: &FileAttributes) -> SftpResult<()> {
        let mut outcome = BatchOutcome::default();
        let mut batch = Batch::new(self.config.windows.batch);
        let mut stack = vec![Work::Visit(root.to_owned())];

        while let Some(work) = stack.pop() {
            let target = match work {
                Work::Visit(dir) => {
                    let entries = match self.read_dir(&dir).await {
                        Ok(entries) => entries,
                        Err(error) if error.is_transport() => return Err(error),
                        Err(_) if dir == root => {
                            // not a directory
                            return self.raw.setstat(root, attrs.clone()).await;
                        }
                        Err(error) => {
                            warn!("can not list {dir} ({error}), setting its own attributes only");
                            Vec::new()
                        }
                    };

                    stack.push(Work::Apply(dir.clone()));
                    for entry in entries.iter().rev() {
                        if entry.filename == "." || entry.filename == ".." || entry.attrs.is_symlink() {
                            continue;
                        }

                        let child = path::join(&dir, &entry.filename);
                        if entry.attrs.is_dir() {
                            stack.push(Work::Visit(child));
                        } else {
                            stack.push(Work::Apply(child));
                        }
                    }
                    continue;
                }
                Work::Apply(target) => target,
            };

            let request_path = target.clone();
            let request_attrs = attrs.clone();
            batch
                .submit(&mut self.raw, target, |id| {
                    Request::SetStat(PathAttrs {
                        id,
                        path: request_path,
                        attrs: request_attrs,
                    })
                })
                .await?;

            if batch.is_full() {
                self.drain_statuses(&mut batch, &mut outcome).await?;
            }
        }

        self.drain_statuses(&mut batch, &mut outcome).await?;
        outcome.into_result()
    }

    /// Sets the permission bits, masked to `0o7777`.
    pub async fn chmod<P: Into<String>>(&mut self, path: P, mode: u32, recursive: bool) -> SftpResult<()> {
        self.setstat(path, permissions(mode), recursive).await
    }

    pub async fn chown<P: Into<String>>(
        &mut self,
        path: P,
        owner: Principal,
        recursive: bool,
    ) -> SftpResult<()> {
        let attrs = if self.raw.version() <= 3 {
            FileAttributes {
                uid: Some(owner.id()?),
                ..Default::default()
            }
        } else {
            FileAttributes {
                owner: Some(owner.name()),
                ..Default::default()
            }
        };

        self.setstat(path, attrs, recursive).await
    }

    pub async fn chgrp<P: Into<String>>(
        &mut self,
        path: P,
        group: Principal,
        recursive: bool,
    ) -> SftpResult<()> {
        let attrs = if self.raw.version() <= 3 {
            FileAttributes {
                gid: Some(group.id()?),
                ..Default::default()
            }
        } else {
            FileAttributes {
                group: Some(group.name()),
                ..Default::default()
            }
        };

        self.setstat(path, attrs, recursive).await
    }

    pub async fn truncate<P: Into<String>>(&mut self, path: P, size: u64) -> SftpResult<()> {
        let attrs = FileAttributes {
            size: Some(size),
            ..Default::default()
        };

        self.setstat(path, attrs, false).await
    }

    /// Sets access and modification times, creating an empty file when
    /// nothing exists at `path`. `mtime` defaults to now, `atime` to
    /// `mtime`.
    pub async fn touch<P: Into<String>>(
        &mut self,
        path: P,
        mtime: Option<i64>,
        atime: Option<i64>,
    ) -> SftpResult<()> {
        let path = self.resolve(&path.into());
        let mtime = mtime.unwrap_or_else(|| Utc::now().timestamp());
        let attrs = FileAttributes {
            atime: Some(FileTime::new(atime.unwrap_or(mtime))),
            mtime: Some(FileTime::new(mtime)),
            ..Default::default()
        };

        let (pflags, access) = if self.raw.version() >= 5 {
            (Disposition::CreateNew.flags(), Open::ACE4_WRITE_DATA)
        } else {
            (OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUDE, 0)
        };

        let opened = self.open_file(&path, pflags, access, attrs.clone()).await;
        self.cache.invalidate(&path);
        self.cache.invalidate_parent_of(&path);

        match opened {
            Ok(handle) => self.close_handle(handle).await,
            // already there
            Err(error) if error.status_code().is_some() => {
                self.raw.setstat(path.as_str(), attrs).await
            }
            Err(error) => Err(error),
        }
    }
}

fn permissions(mode: u32) -> FileAttributes {
    FileAttributes {
        permissions: Some(mode & 0o7777),
        ..Default::default()
    }
}

/// Wraps `error` as a partial transfer when some bytes already went through.
fn partial(transferred: u64, error: Error) -> Error {
    if transferred == 0 {
        error
    } else {
        Error::Partial {
            transferred,
            cause: Box::new(error),
        }
    }
}

/// Every ancestor of `path` and `path` itself, root and dot segments left
/// out: `/a/b` gives `/a` and `/a/b`.
fn prefixes(path: &str) -> Vec<String> {
    let mut prefixes = Vec::new();
    let mut current = String::new();

    for (index, segment) in path.split('/').enumerate() {
        if index > 0 {
            current.push('/');
        }
        current.push_str(segment);

        if !matches!(segment, "" | "." | "..") {
            prefixes.push(current.clone());
        }
    }

    prefixes
}
