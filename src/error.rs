use thiserror::Error;

/// Failures of the wire codecs. Decoding never panics, every short or
/// malformed buffer ends up here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Truncated packet")]
    Truncated,
    #[error("Packet length {length} exceeds the maximum of {max} bytes")]
    PacketTooLarge { length: u32, max: u32 },
    #[error("Empty packet")]
    EmptyPacket,
    #[error("Unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("Bad message: {0}")]
    BadMessage(String),
}
