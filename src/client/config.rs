use std::time::Duration;

use crate::protocol::MAX_PACKET_LEN;

/// Largest READ/WRITE payload requested by default.
pub const MAX_TRANSFER_LEN: u32 = 32 * 1024;

/// How many requests may be outstanding before responses are drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineWindows {
    pub download: usize,
    /// Deletes, setstat and other per-entry work
    pub batch: usize,
    pub upload: usize,
}

impl Default for PipelineWindows {
    fn default() -> Self {
        Self {
            download: 32,
            batch: 32,
            upload: 1024,
        }
    }
}

/// Settings fixed when the session is opened. Most can be toggled later on
/// the [`SftpSession`](super::SftpSession) itself.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Version to ask for through `version-select`, `None` takes the
    /// highest one the server lists.
    pub preferred_version: Option<u32>,
    pub canonicalize_paths: bool,
    pub stat_cache: bool,
    pub allow_arbitrary_length_packets: bool,
    pub max_packet_len: u32,
    pub max_transfer_len: u32,
    /// Budget for each incoming packet
    pub timeout: Duration,
    pub windows: PipelineWindows,
    /// Start `sftp-server` through a shell when the subsystem is refused
    pub sftp_server_fallback: bool,
    pub preserve_time: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preferred_version: Some(3),
            canonicalize_paths: true,
            stat_cache: true,
            allow_arbitrary_length_packets: false,
            max_packet_len: MAX_PACKET_LEN,
            max_transfer_len: MAX_TRANSFER_LEN,
            timeout: Duration::from_secs(10),
            windows: PipelineWindows::default(),
            sftp_server_fallback: true,
            preserve_time: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn preferred_version(mut self, version: Option<u32>) -> Self {
        self.preferred_version = version;
        self
    }

    #[must_use]
    pub fn canonicalize_paths(mut self, enabled: bool) -> Self {
        self.canonicalize_paths = enabled;
        self
    }

    #[must_use]
    pub fn stat_cache(mut self, enabled: bool) -> Self {
        self.stat_cache = enabled;
        self
    }

    #[must_use]
    pub fn allow_arbitrary_length_packets(mut self, enabled: bool) -> Self {
        self.allow_arbitrary_length_packets = enabled;
        self
    }

    #[must_use]
    pub fn max_transfer_len(mut self, len: u32) -> Self {
        self.max_transfer_len = len;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn windows(mut self, windows: PipelineWindows) -> Self {
        self.windows = windows;
        self
    }

    #[must_use]
    pub fn sftp_server_fallback(mut self, enabled: bool) -> Self {
        self.sftp_server_fallback = enabled;
        self
    }

    #[must_use]
    pub fn preserve_time(mut self, enabled: bool) -> Self {
        self.preserve_time = enabled;
        self
    }

    pub(crate) fn packet_limit(&self) -> Option<u32> {
        if self.allow_arbitrary_length_packets {
            None
        } else {
            Some(self.max_packet_len)
        }
    }
}
