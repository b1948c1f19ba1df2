use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::assembler::{CompleteFrame, LinkFramer};
use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes logical frames, fragmented as needed, to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    framer: LinkFramer,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            framer: LinkFramer::with_config(config),
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &CompleteFrame) -> Result<()> {
        self.send(frame.slot, frame.kind, frame.payload.as_ref())
    }

    /// Fragment and send a payload; every fragment is written before returning.
    pub fn send(&mut self, slot: u8, kind: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        self.framer.encode(slot, kind, payload, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
