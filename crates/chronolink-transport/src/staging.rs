//! Transmit staging buffer with scoped write access.
//!
//! A writer must hold a [`StagingGuard`] while it fills the buffer and until
//! the link has finished sending it. Dropping the guard releases access on
//! every exit path, including early returns on error.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

const INITIAL_STAGING_CAPACITY: usize = 1024;

/// Shared transmit buffer guarded by a write-access token.
#[derive(Debug)]
pub struct TxStaging {
    state: Mutex<StagingState>,
    released: Condvar,
}

#[derive(Debug)]
struct StagingState {
    held: bool,
    buf: BytesMut,
}

impl TxStaging {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StagingState {
                held: false,
                buf: BytesMut::with_capacity(INITIAL_STAGING_CAPACITY),
            }),
            released: Condvar::new(),
        }
    }

    /// Wait up to `timeout` for exclusive write access.
    ///
    /// The returned guard starts with an empty buffer.
    pub fn acquire(&self, timeout: Duration) -> Result<StagingGuard<'_>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        while state.held {
            let now = Instant::now();
            if now >= deadline {
                debug!(?timeout, "staging buffer busy");
                return Err(TransportError::WriteAccessDenied(timeout));
            }
            let (next, _) = self
                .released
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }

        state.held = true;
        let mut buf = std::mem::take(&mut state.buf);
        buf.clear();
        trace!("staging write access granted");
        Ok(StagingGuard { owner: self, buf })
    }

    /// Whether a writer currently holds the buffer.
    pub fn is_held(&self) -> bool {
        self.lock_state().held
    }

    fn lock_state(&self) -> MutexGuard<'_, StagingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, buf: BytesMut) {
        let mut state = self.lock_state();
        state.buf = buf;
        state.held = false;
        drop(state);
        self.released.notify_one();
        trace!("staging write access released");
    }
}

impl Default for TxStaging {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive write access to a [`TxStaging`] buffer.
pub struct StagingGuard<'a> {
    owner: &'a TxStaging,
    buf: BytesMut,
}

impl StagingGuard<'_> {
    /// Append bytes to the staged buffer.
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Mutable access for encoders that write straight into the buffer.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// The staged bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        self.owner.release(std::mem::take(&mut self.buf));
    }
}

/// A link whose transmissions always pass through a staging buffer.
///
/// Several producers may share one `StagedTransmitter` (behind an `Arc`);
/// each send holds write access from the first staged byte until the link
/// has accepted the whole buffer.
pub struct StagedTransmitter<T> {
    staging: TxStaging,
    link: Mutex<T>,
}

impl<T: Transport> StagedTransmitter<T> {
    pub fn new(link: T) -> Self {
        Self {
            staging: TxStaging::new(),
            link: Mutex::new(link),
        }
    }

    /// Stage `bytes` and transmit them.
    pub fn send(&self, bytes: &[u8], access_timeout: Duration) -> Result<()> {
        self.send_with(access_timeout, |buf| buf.put_slice(bytes))
    }

    /// Let `fill` populate the staged buffer, then transmit it.
    pub fn send_with<F>(&self, access_timeout: Duration, fill: F) -> Result<()>
    where
        F: FnOnce(&mut BytesMut),
    {
        let mut guard = self.staging.acquire(access_timeout)?;
        fill(guard.buffer_mut());

        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        link.transmit(guard.as_bytes())
    }

    /// The staging buffer, for callers that coordinate access themselves.
    pub fn staging(&self) -> &TxStaging {
        &self.staging
    }
}

impl<T> std::fmt::Debug for StagedTransmitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedTransmitter")
            .field("staging", &self.staging)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryTransport;

    #[test]
    fn guard_releases_on_drop() {
        let staging = TxStaging::new();
        {
            let mut guard = staging
                .acquire(Duration::from_millis(10))
                .expect("first acquire");
            guard.write(b"abc");
            assert!(staging.is_held());
        }
        assert!(!staging.is_held());

        let guard = staging
            .acquire(Duration::from_millis(10))
            .expect("second acquire");
        assert!(guard.as_bytes().is_empty(), "buffer starts empty");
    }

    #[test]
    fn second_writer_is_denied_while_held() {
        let staging = TxStaging::new();
        let _guard = staging
            .acquire(Duration::from_millis(10))
            .expect("first acquire");

        let err = staging
            .acquire(Duration::from_millis(20))
            .err()
            .expect("busy buffer must be denied");
        assert!(matches!(err, TransportError::WriteAccessDenied(_)));
    }

    #[test]
    fn guard_released_on_error_path() {
        fn fill_then_fail(staging: &TxStaging) -> Result<()> {
            let mut guard = staging.acquire(Duration::from_millis(10))?;
            guard.write(b"partial");
            Err(TransportError::Disconnected)
        }

        let staging = TxStaging::new();
        assert!(fill_then_fail(&staging).is_err());
        assert!(!staging.is_held());
    }

    #[test]
    fn waiting_writer_gets_access_after_release() {
        let staging = Arc::new(TxStaging::new());
        let guard = staging
            .acquire(Duration::from_millis(10))
            .expect("first acquire");

        let waiter = {
            let staging = Arc::clone(&staging);
            std::thread::spawn(move || staging.acquire(Duration::from_secs(2)).is_ok())
        };

        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(waiter.join().expect("waiter thread"));
    }

    #[test]
    fn staged_transmitter_sends_whole_buffer() {
        let (near, mut far) = MemoryTransport::pair();
        let tx = StagedTransmitter::new(near);

        tx.send_with(Duration::from_millis(10), |buf| {
            buf.put_slice(b"head-");
            buf.put_slice(b"tail");
        })
        .expect("staged send");

        let got = far
            .receive(Duration::from_millis(100))
            .expect("receive")
            .expect("bytes");
        assert_eq!(got.as_ref(), b"head-tail");
        assert!(!tx.staging().is_held());
    }
}
