//! Length-prefixed packet framing.
//!
//! Every packet on the channel is `u32 length`, `u8 type`, then `length - 1`
//! bytes of body. Bytes arrive in arbitrary chunks, [`PacketReader`] keeps
//! the unconsumed tail until a whole frame is available.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::PacketType;
use crate::error::ProtocolError;

/// Largest incoming packet accepted unless arbitrary lengths are enabled.
pub const MAX_PACKET_LEN: u32 = 256 * 1024;

/// A framed packet whose body has not been interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub packet_type: PacketType,
    /// Everything after the type byte, request id included.
    pub body: Bytes,
}

impl RawPacket {
    pub fn request_id(&self) -> Option<u32> {
        if !self.packet_type.has_request_id() || self.body.len() < 4 {
            return None;
        }

        Some((&self.body[..4]).get_u32())
    }
}

/// Prefixes a body with its length and type byte.
#[allow(clippy::cast_possible_truncation)]
pub fn frame(packet_type: PacketType, body: &[u8]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(body.len() + 5);
    bytes.put_u32(body.len() as u32 + 1);
    bytes.put_u8(packet_type.into());
    bytes.put_slice(body);
    bytes.freeze()
}

/// Decodes exactly one packet from the front of `bytes`.
///
/// Unlike [`PacketReader`] a short buffer is an error here.
pub fn decode_packet(bytes: &mut Bytes, max_len: Option<u32>) -> Result<RawPacket, ProtocolError> {
    if bytes.len() < 4 {
        return Err(ProtocolError::Truncated);
    }

    let length = check_length((&bytes[..4]).get_u32(), max_len)?;
    if bytes.len() < frame_len(length)? {
        return Err(ProtocolError::Truncated);
    }

    bytes.advance(4);
    let frame = bytes.split_to(length as usize);
    split_frame(frame)
}

fn check_length(length: u32, max_len: Option<u32>) -> Result<u32, ProtocolError> {
    if length == 0 {
        return Err(ProtocolError::EmptyPacket);
    }

    match max_len {
        Some(max) if length > max => Err(ProtocolError::PacketTooLarge { length, max }),
        _ => Ok(length),
    }
}

/// Bytes a frame of `length` occupies, prefix included, or `PacketTooLarge`
/// when that does not fit in memory on this host.
fn frame_len(length: u32) -> Result<usize, ProtocolError> {
    usize::try_from(length)
        .ok()
        .and_then(|length| length.checked_add(4))
        .ok_or(ProtocolError::PacketTooLarge {
            length,
            max: u32::try_from(usize::MAX - 4).unwrap_or(u32::MAX),
        })
}

fn split_frame(mut frame: Bytes) -> Result<RawPacket, ProtocolError> {
    let packet_type = PacketType::try_from(frame.get_u8())?;
    Ok(RawPacket {
        packet_type,
        body: frame,
    })
}

/// Incremental decoder over a byte stream.
#[derive(Debug, Default)]
pub struct PacketReader {
    buffer: BytesMut,
    max_len: Option<u32>,
}

impl PacketReader {
    /// `None` accepts packets of any length.
    pub fn new(max_len: Option<u32>) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_len,
        }
    }

    pub fn set_max_len(&mut self, max_len: Option<u32>) {
        self.max_len = max_len;
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next complete packet, or `None` when more bytes are
    /// needed. A frame with an unknown type is consumed before the error is
    /// returned so the stream stays aligned.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, ProtocolError> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }

        let length = check_length((&self.buffer[..4]).get_u32(), self.max_len)?;
        if self.buffer.len() < frame_len(length)? {
            return Ok(None);
        }

        self.buffer.advance(4);
        let frame = self.buffer.split_to(length as usize).freeze();
        split_frame(frame).map(Some)
    }
}
