use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// A byte link to the rest of the harness network.
///
/// Links carry raw bytes only. Framing and addressing happen in the layers
/// above, so a link may deliver a frame split across several `receive`
/// calls, or several frames in one.
pub trait Transport: Send {
    /// Hand `bytes` to the link. Returns once the bytes are queued for sending.
    fn transmit(&mut self, bytes: &[u8]) -> Result<()>;

    /// Block for up to `timeout` until bytes arrive.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing received.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).transmit(bytes)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).receive(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).transmit(bytes)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        (**self).receive(timeout)
    }
}
