//! Single-in-flight command channel with bounded retries.
//!
//! State machine per command:
//! `Idle -> Sending -> AwaitResponse -> {Success | Retry -> Sending | Failed}`.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use chronolink_frame::{LinkFramer, COMMAND, SYNC};
use chronolink_protocol::message::MasterToSlave;
use chronolink_protocol::{Address, DeviceId, Envelope, FrameParser, Message, MessageKind, PacketCodec};
use chronolink_transport::Transport;
use tracing::{debug, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{NodeError, Result};

/// Upper bound on reads spent discarding stale input before a command.
const MAX_STALE_READS: usize = 64;

/// Where the channel is in its current command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    Idle = 0,
    Sending = 1,
    AwaitResponse = 2,
    Retry = 3,
    Success = 4,
    Failed = 5,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Sending,
            2 => Self::AwaitResponse,
            3 => Self::Retry,
            4 => Self::Success,
            5 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

/// The reply a command is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub kind: MessageKind,
    /// Only accept replies from this device.
    pub from: Option<DeviceId>,
}

impl Expectation {
    pub fn new(kind: MessageKind) -> Self {
        Self { kind, from: None }
    }

    /// Expect `kind` from device `id`.
    pub fn from_device(kind: MessageKind, id: DeviceId) -> Self {
        Self {
            kind,
            from: Some(id),
        }
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        envelope.kind() == self.kind
            && self.from.is_none_or(|id| envelope.device() == Some(id))
    }
}

struct Link<T> {
    transport: T,
    framer: LinkFramer,
    parser: FrameParser,
}

/// Sends commands to slaves and correlates their replies.
///
/// Exactly one command may be outstanding. A `send` that finds another one
/// in flight fails with [`NodeError::ChannelBusy`] instead of queueing.
pub struct ReliableCommandChannel<T> {
    link: Mutex<Link<T>>,
    state: AtomicU8,
    config: ChannelConfig,
}

impl<T: Transport> ReliableCommandChannel<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    pub fn with_config(transport: T, config: ChannelConfig) -> Self {
        Self {
            link: Mutex::new(Link {
                transport,
                framer: LinkFramer::new(),
                parser: FrameParser::new(),
            }),
            state: AtomicU8::new(ChannelState::Idle as u8),
            config,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ChannelState) {
        trace!(?state, "channel state");
        self.state.store(state as u8, Ordering::Release);
    }

    /// Send `message` without waiting for anything back.
    pub fn broadcast(&self, message: &Message, address: Address) -> Result<()> {
        self.send(message, address, None).map(|_| ())
    }

    /// Send `message` and wait for the reply described by `expect`.
    pub fn request(
        &self,
        message: &Message,
        address: Address,
        expect: Expectation,
    ) -> Result<Envelope> {
        self.send(message, address, Some(expect))?
            .ok_or(NodeError::RetriesExhausted {
                expected: expect.kind,
                attempts: self.config.attempts(),
            })
    }

    /// Transmit `message`; with an expectation, retry until it is met.
    ///
    /// Makes at most `retry_times + 1` transmit attempts, then fails with
    /// [`NodeError::RetriesExhausted`]. Without an expectation the frame is
    /// sent once and `Ok(None)` returned.
    pub fn send(
        &self,
        message: &Message,
        address: Address,
        expect: Option<Expectation>,
    ) -> Result<Option<Envelope>> {
        let mut link = match self.link.try_lock() {
            Ok(link) => link,
            Err(TryLockError::WouldBlock) => return Err(NodeError::ChannelBusy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let mut frame = BytesMut::new();
        PacketCodec::pack_frame(message, address, &mut frame)?;
        let mut wire = BytesMut::new();
        link.framer
            .encode(self.config.slot, link_kind(message), &frame, &mut wire)?;

        link.drain_stale()?;

        let Some(expect) = expect else {
            self.set_state(ChannelState::Sending);
            let sent = link.transport.transmit(&wire);
            self.set_state(ChannelState::Idle);
            sent?;
            trace!(message = message.name(), %address, "sent without reply");
            return Ok(None);
        };

        let attempts = self.config.attempts();
        for attempt in 1..=attempts {
            self.set_state(ChannelState::Sending);
            if let Err(err) = link.transport.transmit(&wire) {
                self.set_state(ChannelState::Failed);
                return Err(err.into());
            }

            self.set_state(ChannelState::AwaitResponse);
            match link.await_reply(&expect, self.config.response_timeout) {
                Ok(Some(envelope)) => {
                    self.set_state(ChannelState::Success);
                    debug!(
                        message = message.name(),
                        reply = envelope.message.name(),
                        attempt,
                        "command acknowledged"
                    );
                    return Ok(Some(envelope));
                }
                Ok(None) if attempt < attempts => {
                    self.set_state(ChannelState::Retry);
                    warn!(
                        message = message.name(),
                        %address,
                        attempt,
                        "no reply, retrying"
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    self.set_state(ChannelState::Failed);
                    return Err(err);
                }
            }
        }

        self.set_state(ChannelState::Failed);
        warn!(message = message.name(), %address, attempts, "retries exhausted");
        Err(NodeError::RetriesExhausted {
            expected: expect.kind,
            attempts,
        })
    }

    /// Give back the transport.
    pub fn into_inner(self) -> T {
        self.link
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
    }
}

impl<T: Transport> Link<T> {
    /// Discard whatever arrived since the last command finished.
    ///
    /// Replies are matched by kind and device only, so a late answer to an
    /// earlier command would otherwise satisfy the next one.
    fn drain_stale(&mut self) -> Result<()> {
        let mut dropped = self.framer.buffered();
        for _ in 0..MAX_STALE_READS {
            match self.transport.receive(Duration::ZERO)? {
                Some(bytes) => dropped += bytes.len(),
                None => break,
            }
        }
        self.framer.reset();
        if dropped > 0 {
            debug!(bytes = dropped, "stale input discarded");
        }
        Ok(())
    }

    /// Wait until a matching reply is parsed or `timeout` elapses.
    fn await_reply(&mut self, expect: &Expectation, timeout: Duration) -> Result<Option<Envelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some(bytes) = self.transport.receive(remaining)? else {
                return Ok(None);
            };
            for frame in self.framer.feed(&bytes) {
                let Some(envelope) = self.parser.parse(&frame.payload) else {
                    continue;
                };
                if expect.matches(&envelope) {
                    return Ok(Some(envelope));
                }
                debug!(
                    got = %envelope.kind(),
                    expected = %expect.kind,
                    "unexpected reply ignored"
                );
            }
        }
    }
}

fn link_kind(message: &Message) -> u8 {
    match message {
        Message::MasterToSlave(MasterToSlave::Sync(_)) => SYNC,
        _ => COMMAND,
    }
}

impl<T> std::fmt::Debug for ReliableCommandChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliableCommandChannel")
            .field("config", &self.config)
            .field("state", &ChannelState::from_u8(self.state.load(Ordering::Acquire)))
            .finish_non_exhaustive()
    }
}
