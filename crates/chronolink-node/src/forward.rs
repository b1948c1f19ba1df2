//! Bounded FIFO between the Backend surface and the orchestrator.
//!
//! Each forwarded command carries a one-shot reply slot. The producer blocks
//! on it with `forward_timeout`, which turns the queue into a synchronous
//! request/response contract.

use std::collections::VecDeque;
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::command::{CommandOutcome, DeviceCommand};
use crate::error::{NodeError, Result};

/// Create a connected producer/consumer pair with room for `capacity`
/// pending commands.
pub fn forward_queue(capacity: usize) -> (Forwarder, ForwardReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(QueueState {
            items: VecDeque::with_capacity(capacity),
            producers: 1,
            consumer_alive: true,
        }),
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
        capacity: capacity.max(1),
    });
    (
        Forwarder {
            shared: Arc::clone(&shared),
        },
        ForwardReceiver { shared },
    )
}

struct QueueState {
    items: VecDeque<Forwarded>,
    producers: usize,
    consumer_alive: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A queued command and where its outcome goes.
#[derive(Debug)]
pub struct Forwarded {
    pub command: DeviceCommand,
    reply: SyncSender<CommandOutcome>,
}

impl Forwarded {
    /// Deliver the outcome. A producer that already gave up is ignored.
    pub fn complete(self, outcome: CommandOutcome) {
        if self.reply.send(outcome).is_err() {
            debug!(command = self.command.name(), "producer no longer waiting");
        }
    }
}

/// Producer side; cheap to clone.
pub struct Forwarder {
    shared: Arc<Shared>,
}

impl Forwarder {
    /// Queue `command` and wait for its outcome.
    ///
    /// `push_timeout` bounds the wait for queue space and yields
    /// [`NodeError::QueueBackpressure`]. `reply_timeout` bounds the wait
    /// for the orchestrator and yields [`NodeError::Timeout`].
    pub fn submit(
        &self,
        command: DeviceCommand,
        push_timeout: Duration,
        reply_timeout: Duration,
    ) -> Result<CommandOutcome> {
        let name = command.name();
        let (reply, outcome) = sync_channel(1);
        self.push(Forwarded { command, reply }, push_timeout)?;
        match outcome.recv_timeout(reply_timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => {
                warn!(command = name, timeout = ?reply_timeout, "forwarded command timed out");
                Err(NodeError::Timeout(reply_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(NodeError::Disconnected(format!(
                "orchestrator dropped {name} without an outcome"
            ))),
        }
    }

    /// Queue a command without waiting for the outcome.
    ///
    /// The returned receiver yields the outcome once processed.
    pub fn enqueue(
        &self,
        command: DeviceCommand,
        push_timeout: Duration,
    ) -> Result<Receiver<CommandOutcome>> {
        let (reply, outcome) = sync_channel(1);
        self.push(Forwarded { command, reply }, push_timeout)?;
        Ok(outcome)
    }

    fn push(&self, item: Forwarded, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if !state.consumer_alive {
                return Err(NodeError::Disconnected("orchestrator stopped".to_string()));
            }
            if state.items.len() < self.shared.capacity {
                state.items.push_back(item);
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NodeError::QueueBackpressure {
                    capacity: self.shared.capacity,
                    waited: timeout,
                });
            }
            state = self
                .shared
                .not_full
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Commands currently waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.lock().items.len()
    }
}

impl Clone for Forwarder {
    fn clone(&self) -> Self {
        self.shared.lock().producers += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.producers = state.producers.saturating_sub(1);
        if state.producers == 0 {
            self.shared.not_empty.notify_all();
        }
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}

/// Consumer side, owned by the orchestrator.
pub struct ForwardReceiver {
    shared: Arc<Shared>,
}

impl ForwardReceiver {
    /// Take the oldest command, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` on timeout and `Disconnected` once every producer
    /// is gone and the queue is drained.
    pub fn pop(&self, timeout: Duration) -> Result<Option<Forwarded>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.shared.not_full.notify_one();
                return Ok(Some(item));
            }
            if state.producers == 0 {
                return Err(NodeError::Disconnected("no producers left".to_string()));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = self
                .shared
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Drop for ForwardReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.consumer_alive = false;
        // Pending producers see their reply senders drop.
        state.items.clear();
        self.shared.not_full.notify_all();
    }
}

impl std::fmt::Debug for ForwardReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardReceiver")
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}
