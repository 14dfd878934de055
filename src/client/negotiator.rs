//! Brings a channel from nothing to a ready SFTP session.

use std::collections::BTreeMap;

use super::{
    config::SessionConfig,
    error::{Error, SessionError, SftpResult},
    rawsession::RawSftpSession,
    transport::Transport,
};
use crate::{
    extensions,
    protocol::{Init, Version},
};

/// Shell fallback for servers without an `sftp` subsystem entry. Constant
/// on purpose, nothing is ever interpolated into it.
pub const SFTP_SERVER_COMMAND: &str = "test -x /usr/lib/sftp-server && exec /usr/lib/sftp-server\n\
     test -x /usr/local/lib/sftp-server && exec /usr/local/lib/sftp-server\n\
     exec sftp-server";

/// Versions this client can speak once the handshake is over.
const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 2..=6;

/// Versions that may be reached through `version-select`, best first.
const SELECTABLE_VERSIONS: [u32; 3] = [6, 5, 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    ChannelOpening,
    SubsystemRequested,
    Initialized,
    VersionNegotiated,
    VersionSelecting,
    VersionSelected,
    PathResolved,
    Ready,
    Closed,
    Failed,
}

/// What the handshake settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub version: u32,
    /// Version the server answered `INIT` with
    pub server_version: u32,
    pub extensions: BTreeMap<String, String>,
    /// Parsed `versions` extension, empty when absent
    pub supported_versions: Vec<u32>,
    /// Initial working directory, `None` when it could not be resolved
    pub pwd: Option<String>,
}

/// Picks the version to request through `version-select`, or `None` to stay
/// on the server's default.
///
/// Nothing is selected when the server lists no versions or the client
/// already got what it prefers. Otherwise the preferred version is tried
/// first, then 6, 5 and 4.
pub fn select_version(
    server_version: u32,
    advertised: Option<&[u32]>,
    preferred: Option<u32>,
) -> Option<u32> {
    let advertised = advertised?;
    if preferred == Some(server_version) {
        return None;
    }

    let mut candidates = Vec::with_capacity(SELECTABLE_VERSIONS.len() + 1);
    if let Some(preferred) = preferred {
        candidates.push(preferred);
    }
    candidates.extend(
        SELECTABLE_VERSIONS
            .iter()
            .copied()
            .filter(|version| Some(*version) != preferred),
    );

    candidates
        .into_iter()
        .find(|candidate| advertised.contains(candidate))
        .filter(|version| *version != server_version)
}

/// Drives the handshake and records where it got to.
pub struct Negotiator<'a> {
    config: &'a SessionConfig,
    state: SessionState,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Unopened,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, state: SessionState) {
        debug!("session state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn fail<E: Into<Error>>(&mut self, error: E) -> Error {
        self.transition(SessionState::Failed);
        error.into()
    }

    fn transport_failure(&mut self, message: String) -> Error {
        self.fail(SessionError::Transport(message))
    }

    fn protocol_failure(&mut self, message: String) -> Error {
        self.fail(SessionError::Protocol(message))
    }

    /// Opens the channel, starts the subsystem and negotiates the version.
    /// The working directory is left to [`resolve_pwd`](Self::resolve_pwd).
    pub async fn connect<T: Transport>(
        &mut self,
        mut transport: T,
    ) -> SftpResult<(RawSftpSession<T>, Negotiated)> {
        self.transition(SessionState::ChannelOpening);
        let channel = match transport.open_channel().await {
            Ok(channel) => channel,
            Err(error) => return Err(self.transport_failure(format!("open channel: {error}"))),
        };

        self.transition(SessionState::SubsystemRequested);
        let started = match transport.request_subsystem(channel, "sftp").await {
            Ok(true) => true,
            Ok(false) if self.config.sftp_server_fallback => {
                debug!("sftp subsystem refused, starting sftp-server through exec");
                match transport.exec(channel, SFTP_SERVER_COMMAND).await {
                    Ok(started) => started,
                    Err(error) => return Err(self.transport_failure(format!("exec: {error}"))),
                }
            }
            Ok(false) => false,
            Err(error) => {
                return Err(self.transport_failure(format!("subsystem request: {error}")))
            }
        };

        if !started {
            return Err(self.protocol_failure("server refused the sftp subsystem".to_owned()));
        }

        let mut session = RawSftpSession::new(
            transport,
            channel,
            self.config.packet_limit(),
            self.config.timeout,
        );

        let version = match self.initialize(&mut session).await {
            Ok(version) => version,
            Err(error) => return Err(self.handshake_failure(error)),
        };

        if !SUPPORTED_VERSIONS.contains(&version.version) {
            return Err(self.protocol_failure(format!(
                "unsupported protocol version {}",
                version.version
            )));
        }
        session.set_version(version.version);

        let supported_versions = version
            .extensions
            .get(extensions::VERSIONS)
            .map(|versions| extensions::parse_versions(versions))
            .unwrap_or_default();

        let mut negotiated = Negotiated {
            version: version.version,
            server_version: version.version,
            extensions: version.extensions,
            supported_versions,
            pwd: None,
        };

        let advertised = negotiated
            .extensions
            .contains_key(extensions::VERSIONS)
            .then_some(negotiated.supported_versions.as_slice());

        if let Some(selected) = select_version(
            negotiated.server_version,
            advertised,
            self.config.preferred_version,
        ) {
            if !SUPPORTED_VERSIONS.contains(&selected) {
                return Err(self.protocol_failure(format!(
                    "unsupported protocol version {selected}"
                )));
            }
            self.transition(SessionState::VersionSelecting);
            debug!("selecting protocol version {selected}");

            match session
                .extended(extensions::VERSION_SELECT, extensions::version_select(selected))
                .await
            {
                Ok(_) => {
                    session.set_version(selected);
                    negotiated.version = selected;
                    self.transition(SessionState::VersionSelected);
                }
                Err(Error::Status(status)) => {
                    return Err(self.protocol_failure(format!(
                        "version-select {selected} refused: {}",
                        status.status_code
                    )))
                }
                Err(error) => return Err(self.handshake_failure(error)),
            }
        }

        Ok((session, negotiated))
    }

    async fn initialize<T: Transport>(
        &mut self,
        session: &mut RawSftpSession<T>,
    ) -> SftpResult<Version> {
        session.send_init(Init::new()).await?;
        self.transition(SessionState::Initialized);

        let version = session.read_version().await?;
        debug!(
            "server speaks version {} with extensions {:?}",
            version.version, version.extensions
        );
        self.transition(SessionState::VersionNegotiated);
        Ok(version)
    }

    fn handshake_failure(&mut self, error: Error) -> Error {
        if error.is_transport() || matches!(error, Error::Timeout) {
            self.transport_failure(error.to_string())
        } else {
            self.protocol_failure(error.to_string())
        }
    }

    /// Resolves `.` through `REALPATH`. A server that can not do so leaves
    /// the working directory unknown, which the caller treats as local
    /// path emulation.
    pub async fn resolve_pwd<T: Transport>(
        &mut self,
        session: &mut RawSftpSession<T>,
        negotiated: &mut Negotiated,
    ) -> SftpResult<()> {
        if self.config.canonicalize_paths {
            match session.realpath(".").await {
                Ok(name) if name.files.len() == 1 => {
                    negotiated.pwd = name.files.into_iter().next().map(|file| file.filename);
                }
                Ok(name) => {
                    warn!(
                        "REALPATH . returned {} entries, emulating paths locally",
                        name.files.len()
                    );
                }
                Err(error) if error.is_transport() => return Err(self.fail(error)),
                Err(error) => {
                    warn!("REALPATH . failed ({error}), emulating paths locally");
                }
            }
        }

        self.transition(SessionState::PathResolved);
        self.transition(SessionState::Ready);
        Ok(())
    }
}
