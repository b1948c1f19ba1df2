//! Field-level helpers shared by the message codecs.
//!
//! Every field names its byte order explicitly; there is no global endian
//! policy across message types.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::id::DeviceId;
use crate::status::DeviceStatus;

/// A message body with a fixed or self-describing layout.
pub(crate) trait Body: Sized {
    const NAME: &'static str;

    fn encode(&self, dst: &mut BytesMut) -> Result<()>;

    fn decode(fields: &mut FieldReader<'_>) -> Result<Self>;

    fn read(body: &[u8]) -> Result<Self> {
        Self::decode(&mut FieldReader::new(Self::NAME, body))
    }
}

/// Bounds-checked cursor over a message body.
pub(crate) struct FieldReader<'a> {
    message: &'static str,
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(message: &'static str, buf: &'a [u8]) -> Self {
        Self { message, buf }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(ProtocolError::Truncated {
                message: self.message,
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn u32_be(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn device_id(&mut self) -> Result<DeviceId> {
        self.ensure(4)?;
        let mut wire = [0u8; 4];
        self.buf.copy_to_slice(&mut wire);
        Ok(DeviceId::from_wire(wire))
    }

    pub(crate) fn status(&mut self) -> Result<DeviceStatus> {
        self.u16_le().map(DeviceStatus)
    }

    /// `len: u16 LE` followed by `len` bytes.
    pub(crate) fn len_prefixed(&mut self) -> Result<Bytes> {
        let len = self.u16_le()? as usize;
        self.ensure(len)?;
        Ok(self.buf.copy_to_bytes(len))
    }

    /// `count: u8` followed by `count` entries.
    pub(crate) fn counted<T>(
        &mut self,
        mut entry: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.u8()? as usize;
        (0..count).map(|_| entry(&mut *self)).collect()
    }
}

pub(crate) fn put_len_prefixed(dst: &mut BytesMut, what: &'static str, data: &[u8]) -> Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| ProtocolError::TooLong {
        what,
        len: data.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(len);
    dst.put_slice(data);
    Ok(())
}

pub(crate) fn put_count(dst: &mut BytesMut, what: &'static str, len: usize) -> Result<()> {
    let count = u8::try_from(len).map_err(|_| ProtocolError::TooLong {
        what,
        len,
        max: u8::MAX as usize,
    })?;
    dst.put_u8(count);
    Ok(())
}
