use bytes::Bytes;
use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};
use tokio::time::{self, Instant};

use super::{
    error::{Error, SftpResult},
    transport::{ChannelId, Received, Transport},
};
use crate::{
    extensions::{self, HardlinkExtension, LimitsExtension},
    protocol::{
        Attrs, AttrFlags, Data, Extended, FileAttributes, Fstat, Handle, HandleAttrs, Init, Link,
        Name, Open, OpenFlags, PacketReader, PacketType, Path, PathAttrs, RawPacket, Read, Rename,
        Request, Response, Stat, StatusCode, Symlink, Version, Write,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limits {
    pub packet_len: Option<u64>,
    pub read_len: Option<u64>,
    pub write_len: Option<u64>,
    pub open_handles: Option<u64>,
}

impl From<LimitsExtension> for Limits {
    fn from(limits: LimitsExtension) -> Self {
        let non_zero = |value: u64| if value > 0 { Some(value) } else { None };
        Self {
            packet_len: non_zero(limits.max_packet_len),
            read_len: non_zero(limits.max_read_len),
            write_len: non_zero(limits.max_write_len),
            open_handles: non_zero(limits.max_open_handles),
        }
    }
}

/// Implements raw work with the protocol in request-response format.
/// If the server returns a `Status` packet and it has the code Ok
/// then the packet is returned as Ok in other error cases
/// the packet is stored as Err.
///
/// Requests may be sent ahead of their responses: [`send`](Self::send)
/// hands out the id and [`receive`](Self::receive) waits for exactly that
/// id, buffering any other awaited response that arrives first.
pub struct RawSftpSession<T> {
    transport: T,
    channel: ChannelId,
    reader: PacketReader,
    version: u32,
    next_req_id: u32,
    outstanding: HashSet<u32>,
    pending: HashMap<u32, RawPacket>,
    timeout: Duration,
    limits: Limits,
    connected: bool,
}

macro_rules! into_with_status {
    ($result:ident, $packet:ident) => {
        match $result {
            Response::$packet(p) => Ok(p),
            Response::Status(p) => Err(p.into()),
            other => Err(Error::UnexpectedPacket(other.packet_type())),
        }
    };
}

macro_rules! into_status {
    ($result:ident) => {
        match $result {
            Response::Status(status) if status.status_code == StatusCode::Ok => Ok(()),
            Response::Status(status) => Err(status.into()),
            other => Err(Error::UnexpectedPacket(other.packet_type())),
        }
    };
}

pub(crate) use into_status;
pub(crate) use into_with_status;

impl<T: Transport> RawSftpSession<T> {
    pub fn new(transport: T, channel: ChannelId, max_packet_len: Option<u32>, timeout: Duration) -> Self {
        Self {
            transport,
            channel,
            reader: PacketReader::new(max_packet_len),
            version: crate::protocol::VERSION,
            next_req_id: 1,
            outstanding: HashSet::new(),
            pending: HashMap::new(),
            timeout,
            limits: Limits::default(),
            connected: true,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    /// Set the maximum time to wait for each incoming packet.
    /// Default: 10 seconds
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// `None` accepts incoming packets of any length.
    pub fn set_max_packet_len(&mut self, max_len: Option<u32>) {
        self.reader.set_max_len(max_len);
    }

    /// Setting limits. For the `limits@openssh.com` extension
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn use_next_id(&mut self) -> u32 {
        let id = self.next_req_id;
        self.next_req_id = self.next_req_id.wrapping_add(1);
        id
    }

    /// Closes the channel. Outstanding requests are forgotten.
    pub async fn close_session(&mut self) -> SftpResult<()> {
        if !self.connected {
            return Ok(());
        }

        self.disconnect();
        self.transport
            .close_channel(self.channel)
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.outstanding.clear();
        self.pending.clear();
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> SftpResult<()> {
        if !self.connected {
            return Err(Error::NoConnection);
        }

        match self.transport.send(self.channel, bytes).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.disconnect();
                Err(Error::ConnectionLost("channel refused data".to_owned()))
            }
            Err(error) => {
                self.disconnect();
                Err(Error::ConnectionLost(error.to_string()))
            }
        }
    }

    /// Reads the next packet off the channel. The wait budget starts over
    /// for every packet.
    async fn read_packet(&mut self) -> SftpResult<RawPacket> {
        if !self.connected {
            return Err(Error::NoConnection);
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match self.reader.next_packet() {
                Ok(Some(packet)) => {
                    trace!(
                        "received {} id {:?} ({} bytes)",
                        packet.packet_type,
                        packet.request_id(),
                        packet.body.len()
                    );
                    return Ok(packet);
                }
                Ok(None) => {}
                Err(error) => {
                    // the stream can not be resynchronised after a bad frame
                    self.disconnect();
                    return Err(error.into());
                }
            }

            match time::timeout_at(deadline, self.transport.receive(self.channel)).await {
                Ok(Ok(Received::Data(data))) => self.reader.feed(&data),
                Ok(Ok(Received::Closed)) => {
                    self.disconnect();
                    return Err(Error::ConnectionLost("channel closed".to_owned()));
                }
                Ok(Ok(Received::Timeout)) | Err(_) => return Err(Error::Timeout),
                Ok(Err(error)) => {
                    self.disconnect();
                    return Err(Error::ConnectionLost(error.to_string()));
                }
            }
        }
    }

    pub(crate) async fn send_init(&mut self, init: Init) -> SftpResult<()> {
        let bytes = Request::Init(init).to_bytes(self.version);
        trace!("sending Init ({} bytes)", bytes.len());
        self.write_bytes(&bytes).await
    }

    pub(crate) async fn read_version(&mut self) -> SftpResult<Version> {
        let packet = self.read_packet().await?;
        match Response::decode(packet, self.version)? {
            Response::Version(version) => Ok(version),
            other => Err(Error::UnexpectedPacket(other.packet_type())),
        }
    }

    /// Sends a request without waiting for its response.
    pub async fn send(&mut self, request: Request) -> SftpResult<u32> {
        let id = request
            .id()
            .ok_or(Error::UnexpectedPacket(PacketType::Init))?;
        let bytes = request.to_bytes(self.version);
        trace!(
            "sending {} id {} ({} bytes)",
            request.packet_type(),
            id,
            bytes.len()
        );

        self.write_bytes(&bytes).await?;
        let _ = self.outstanding.insert(id);
        Ok(id)
    }

    /// Waits for the response to `id`. Responses to other outstanding
    /// requests seen on the way are kept for later.
    pub async fn receive(&mut self, id: u32) -> SftpResult<Response> {
        if !self.connected {
            return Err(Error::NoConnection);
        }

        if let Some(packet) = self.pending.remove(&id) {
            let _ = self.outstanding.remove(&id);
            return Ok(Response::decode(packet, self.version)?);
        }

        if !self.outstanding.contains(&id) {
            return Err(Error::UnexpectedBehavior(format!(
                "no request with id {id} is outstanding"
            )));
        }

        loop {
            let packet = match self.read_packet().await {
                Ok(packet) => packet,
                Err(Error::Timeout) => {
                    let _ = self.outstanding.remove(&id);
                    return Err(Error::Timeout);
                }
                Err(error) => return Err(error),
            };

            match packet.request_id() {
                Some(packet_id) if packet_id == id => {
                    let _ = self.outstanding.remove(&id);
                    return Ok(Response::decode(packet, self.version)?);
                }
                Some(packet_id) if self.outstanding.contains(&packet_id) => {
                    let _ = self.pending.insert(packet_id, packet);
                }
                packet_id => {
                    warn!(
                        "dropping unsolicited {} with id {:?}",
                        packet.packet_type, packet_id
                    );
                }
            }
        }
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, request: Request) -> SftpResult<Response> {
        let id = self.send(request).await?;
        self.receive(id).await
    }

    pub async fn open<P: Into<String>>(
        &mut self,
        filename: P,
        pflags: OpenFlags,
        desired_access: u32,
        attrs: FileAttributes,
    ) -> SftpResult<Handle> {
        let id = self.use_next_id();
        let result = self
            .request(Request::Open(Open {
                id,
                filename: filename.into(),
                pflags,
                desired_access,
                attrs,
            }))
            .await?;

        into_with_status!(result, Handle)
    }

    pub async fn close(&mut self, handle: Bytes) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self.request(Request::Close(Handle { id, handle })).await?;
        into_status!(result)
    }

    pub async fn read(&mut self, handle: Bytes, offset: u64, len: u32) -> SftpResult<Data> {
        let id = self.use_next_id();
        let result = self
            .request(Request::Read(Read {
                id,
                handle,
                offset,
                len,
            }))
            .await?;

        into_with_status!(result, Data)
    }

    pub async fn write(&mut self, handle: Bytes, offset: u64, data: Bytes) -> SftpResult<()> {
        if let Some(limit) = self.limits.write_len {
            if data.len() as u64 > limit {
                return Err(Error::Limited(format!(
                    "write of {} bytes exceeds the server limit of {limit}",
                    data.len()
                )));
            }
        }

        let id = self.use_next_id();
        let result = self
            .request(Request::Write(Write {
                id,
                handle,
                offset,
                data,
            }))
            .await?;

        into_status!(result)
    }

    pub async fn lstat<P: Into<String>>(&mut self, path: P) -> SftpResult<Attrs> {
        let id = self.use_next_id();
        let flags = AttrFlags::supported(self.version);
        let result = self
            .request(Request::Lstat(Stat {
                id,
                path: path.into(),
                flags,
            }))
            .await?;

        into_with_status!(result, Attrs)
    }

    pub async fn stat<P: Into<String>>(&mut self, path: P) -> SftpResult<Attrs> {
        let id = self.use_next_id();
        let flags = AttrFlags::supported(self.version);
        let result = self
            .request(Request::Stat(Stat {
                id,
                path: path.into(),
                flags,
            }))
            .await?;

        into_with_status!(result, Attrs)
    }

    pub async fn fstat(&mut self, handle: Bytes) -> SftpResult<Attrs> {
        let id = self.use_next_id();
        let flags = AttrFlags::supported(self.version);
        let result = self
            .request(Request::Fstat(Fstat { id, handle, flags }))
            .await?;

        into_with_status!(result, Attrs)
    }

    pub async fn setstat<P: Into<String>>(
        &mut self,
        path: P,
        attrs: FileAttributes,
    ) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self
            .request(Request::SetStat(PathAttrs {
                id,
                path: path.into(),
                attrs,
            }))
            .await?;

        into_status!(result)
    }

    pub async fn fsetstat(&mut self, handle: Bytes, attrs: FileAttributes) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self
            .request(Request::FSetStat(HandleAttrs { id, handle, attrs }))
            .await?;

        into_status!(result)
    }

    pub async fn opendir<P: Into<String>>(&mut self, path: P) -> SftpResult<Handle> {
        let id = self.use_next_id();
        let result = self
            .request(Request::OpenDir(Path {
                id,
                path: path.into(),
            }))
            .await?;

        into_with_status!(result, Handle)
    }

    pub async fn readdir(&mut self, handle: Bytes) -> SftpResult<Name> {
        let id = self.use_next_id();
        let result = self.request(Request::ReadDir(Handle { id, handle })).await?;
        into_with_status!(result, Name)
    }

    pub async fn remove<P: Into<String>>(&mut self, path: P) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self
            .request(Request::Remove(Path {
                id,
                path: path.into(),
            }))
            .await?;

        into_status!(result)
    }

    pub async fn mkdir<P: Into<String>>(&mut self, path: P, attrs: FileAttributes) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self
            .request(Request::MkDir(PathAttrs {
                id,
                path: path.into(),
                attrs,
            }))
            .await?;

        into_status!(result)
    }

    pub async fn rmdir<P: Into<String>>(&mut self, path: P) -> SftpResult<()> {
        let id = self.use_next_id();
        let result = self
            .request(Request::RmDir(Path {
                id,
                path: path.into(),
            }))
            .await?;

        into_status!(result)
    }

    pub async fn realpath<P: Into<String>>(&mut self, path: P) -> SftpResult<Name> {
        let id = self.use_next_id();
        let result = self
            .request(Request::RealPath(Path {
                id,
                path: path.into(),
            }))
            .await?;

        into_with_status!(result, Name)
    }

    pub async fn rename<O, N>(&mut self, oldpath: O, newpath: N, flags: u32) -> SftpResult<()>
    where
        O: Into<String>,
        N: Into<String>,
    {
        let id = self.use_next_id();
        let result = self
            .request(Request::Rename(Rename {
                id,
                oldpath: oldpath.into(),
                newpath: newpath.into(),
                flags,
            }))
            .await?;

        into_status!(result)
    }

    pub async fn readlink<P: Into<String>>(&mut self, path: P) -> SftpResult<Name> {
        let id = self.use_next_id();
        let result = self
            .request(Request::ReadLink(Path {
                id,
                path: path.into(),
            }))
            .await?;

        into_with_status!(result, Name)
    }

    /// Sends the two paths in wire order, see [`Symlink`].
    pub async fn symlink<L, P>(&mut self, linkpath: L, targetpath: P) -> SftpResult<()>
    where
        L: Into<String>,
        P: Into<String>,
    {
        let id = self.use_next_id();
        let result = self
            .request(Request::Symlink(Symlink {
                id,
                linkpath: linkpath.into(),
                targetpath: targetpath.into(),
            }))
            .await?;

        into_status!(result)
    }

    pub async fn link<L, P>(&mut self, new_link_path: L, existing_path: P, symlink: bool) -> SftpResult<()>
    where
        L: Into<String>,
        P: Into<String>,
    {
        let id = self.use_next_id();
        let result = self
            .request(Request::Link(Link {
                id,
                new_link_path: new_link_path.into(),
                existing_path: existing_path.into(),
                symlink,
            }))
            .await?;

        into_status!(result)
    }

    /// Performs an extended request. A successful reply is either an
    /// `EXTENDED_REPLY` or an OK status, the latter comes back as empty data.
    pub async fn extended<R: Into<String>>(&mut self, request: R, data: Bytes) -> SftpResult<Bytes> {
        let id = self.use_next_id();
        let result = self
            .request(Request::Extended(Extended {
                id,
                request: request.into(),
                data,
            }))
            .await?;

        match result {
            Response::ExtendedReply(reply) => Ok(reply.data),
            Response::Status(status) if status.status_code == StatusCode::Ok => Ok(Bytes::new()),
            Response::Status(status) => Err(status.into()),
            other => Err(Error::UnexpectedPacket(other.packet_type())),
        }
    }

    pub async fn limits_extension(&mut self) -> SftpResult<LimitsExtension> {
        let data = self.extended(extensions::LIMITS, Bytes::new()).await?;
        Ok(LimitsExtension::decode(data)?)
    }

    pub async fn hardlink<O, N>(&mut self, oldpath: O, newpath: N) -> SftpResult<()>
    where
        O: Into<String>,
        N: Into<String>,
    {
        let data = HardlinkExtension {
            oldpath: oldpath.into(),
            newpath: newpath.into(),
        }
        .encode();

        self.extended(extensions::HARDLINK, data).await.map(|_| ())
    }
}
