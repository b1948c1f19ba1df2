use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// One end of an in-process byte link.
///
/// Created in connected pairs; bytes transmitted on one end are received on
/// the other, one chunk per `transmit` call.
pub struct MemoryTransport {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = channel();
        let (right_tx, left_rx) = channel();
        (
            Self {
                tx: left_tx,
                rx: left_rx,
            },
            Self {
                tx: right_tx,
                rx: right_rx,
            },
        )
    }

    /// Take every chunk that is already waiting, without blocking.
    pub fn drain(&mut self) -> Result<Vec<Bytes>> {
        let mut chunks = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => chunks.push(chunk),
                Err(TryRecvError::Empty) => return Ok(chunks),
                Err(TryRecvError::Disconnected) if !chunks.is_empty() => return Ok(chunks),
                Err(TryRecvError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }
    }
}

impl Transport for MemoryTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(len = bytes.len(), "memory link transmit");
        self.tx
            .send(Bytes::copy_from_slice(bytes))
            .map_err(|_| TransportError::Disconnected)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport").finish_non_exhaustive()
    }
}
