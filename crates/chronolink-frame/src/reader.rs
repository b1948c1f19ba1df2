use std::io::{ErrorKind, Read};

use crate::assembler::{CompleteFrame, LinkFramer};
use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete logical frames from any `Read` stream.
///
/// Handles partial reads, noise and fragmentation internally; callers
/// always get whole frames.
pub struct FrameReader<T> {
    inner: T,
    framer: LinkFramer,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            framer: LinkFramer::with_config(config),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<CompleteFrame> {
        loop {
            if let Some(frame) = self.framer.next_frame() {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.framer.extend(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
