use std::mem::size_of;

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

pub trait TryBuf: Buf {
    fn try_read_u8(&mut self) -> Result<u8, ProtocolError>;
    fn try_read_u32(&mut self) -> Result<u32, ProtocolError>;
    fn try_read_u64(&mut self) -> Result<u64, ProtocolError>;
    fn try_read_i64(&mut self) -> Result<i64, ProtocolError>;
    fn try_read_bytes(&mut self) -> Result<Bytes, ProtocolError>;
    fn try_read_string(&mut self) -> Result<String, ProtocolError>;
}

impl<T: Buf> TryBuf for T {
    fn try_read_u8(&mut self) -> Result<u8, ProtocolError> {
        if self.remaining() < size_of::<u8>() {
            return Err(ProtocolError::Truncated);
        }

        Ok(self.get_u8())
    }

    fn try_read_u32(&mut self) -> Result<u32, ProtocolError> {
        if self.remaining() < size_of::<u32>() {
            return Err(ProtocolError::Truncated);
        }

        Ok(self.get_u32())
    }

    fn try_read_u64(&mut self) -> Result<u64, ProtocolError> {
        if self.remaining() < size_of::<u64>() {
            return Err(ProtocolError::Truncated);
        }

        Ok(self.get_u64())
    }

    fn try_read_i64(&mut self) -> Result<i64, ProtocolError> {
        if self.remaining() < size_of::<i64>() {
            return Err(ProtocolError::Truncated);
        }

        Ok(self.get_i64())
    }

    fn try_read_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.try_read_u32()? as usize;
        if self.remaining() < len {
            return Err(ProtocolError::Truncated);
        }

        Ok(self.copy_to_bytes(len))
    }

    fn try_read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.try_read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::BadMessage("string is not valid UTF-8".to_owned()))
    }
}

pub trait PutBuf: BufMut {
    fn put_str(&mut self, str: &str);
    fn put_bytes_prefixed(&mut self, bytes: &[u8]);
}

impl<T: BufMut> PutBuf for T {
    fn put_str(&mut self, str: &str) {
        self.put_bytes_prefixed(str.as_bytes());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn put_bytes_prefixed(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.put_slice(bytes);
    }
}
