use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::{decode_fragment, encode_frames, FrameConfig};
use crate::error::Result;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// How fragment indices are treated while reassembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReassemblyPolicy {
    /// Fragments must arrive as 0, 1, 2, ... A fragment with index 0 always
    /// starts a new frame; any other index out of sequence discards the
    /// frame in progress.
    #[default]
    Strict,
    /// Fragments are appended in arrival order and indices are ignored.
    Permissive,
}

/// A reassembled logical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteFrame {
    /// Slot / packet-kind byte of the first fragment.
    pub slot: u8,
    /// Link frame type of the first fragment.
    pub kind: u8,
    /// Concatenated fragment payloads.
    pub payload: Bytes,
}

impl CompleteFrame {
    pub fn new(slot: u8, kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            slot,
            kind,
            payload: payload.into(),
        }
    }
}

struct Partial {
    slot: u8,
    kind: u8,
    next_index: usize,
    data: BytesMut,
}

/// Turns a raw byte stream into complete logical frames, and back.
pub struct LinkFramer {
    buf: BytesMut,
    partial: Option<Partial>,
    config: FrameConfig,
}

impl LinkFramer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            partial: None,
            config,
        }
    }

    /// Fragment `payload` and append the encoded fragments to `dst`.
    pub fn encode(&self, slot: u8, kind: u8, payload: &[u8], dst: &mut BytesMut) -> Result<usize> {
        encode_frames(slot, kind, payload, self.config.max_chunk, dst)
    }

    /// Feed received bytes and collect every frame they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CompleteFrame> {
        self.extend(bytes);
        let mut complete = Vec::new();
        while let Some(frame) = self.next_frame() {
            complete.push(frame);
        }
        complete
    }

    /// Buffer received bytes without decoding them yet.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decode buffered bytes until one frame completes.
    pub fn next_frame(&mut self) -> Option<CompleteFrame> {
        loop {
            let fragment = decode_fragment(&mut self.buf, self.config.max_chunk)?;
            trace!(
                slot = fragment.slot,
                kind = fragment.kind,
                index = fragment.index,
                more = fragment.more,
                len = fragment.payload.len(),
                "fragment received"
            );
            if let Some(frame) = self.accept(fragment) {
                return Some(frame);
            }
        }
    }

    /// Drop buffered bytes and any frame in progress.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.partial = None;
    }

    /// Number of undecoded bytes held.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether a multi-fragment frame is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.partial.is_some()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn accept(&mut self, fragment: crate::codec::LinkFrame) -> Option<CompleteFrame> {
        let index = fragment.index as usize;
        match self.config.reassembly {
            ReassemblyPolicy::Strict => {
                if index == 0 {
                    if let Some(stale) = self.partial.take() {
                        debug!(
                            received = stale.next_index,
                            "new frame started before previous completed; discarding"
                        );
                    }
                } else {
                    match &self.partial {
                        Some(partial) if partial.next_index == index => {}
                        Some(partial) => {
                            warn!(
                                expected = partial.next_index,
                                got = index,
                                "out-of-sequence fragment; discarding frame"
                            );
                            self.partial = None;
                            return None;
                        }
                        None => {
                            debug!(index, "fragment without frame start; dropping");
                            return None;
                        }
                    }
                }
            }
            ReassemblyPolicy::Permissive => {}
        }

        let partial = self.partial.get_or_insert_with(|| Partial {
            slot: fragment.slot,
            kind: fragment.kind,
            next_index: 0,
            data: BytesMut::new(),
        });

        if partial.data.len() + fragment.payload.len() > self.config.max_frame_size {
            warn!(
                max = self.config.max_frame_size,
                "reassembled frame too large; discarding"
            );
            self.partial = None;
            return None;
        }

        partial.data.extend_from_slice(&fragment.payload);
        partial.next_index += 1;

        if fragment.more {
            return None;
        }

        let done = self.partial.take()?;
        Some(CompleteFrame {
            slot: done.slot,
            kind: done.kind,
            payload: done.data.freeze(),
        })
    }
}

impl Default for LinkFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LinkFramer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkFramer")
            .field("buffered", &self.buf.len())
            .field("in_progress", &self.partial.is_some())
            .field("config", &self.config)
            .finish()
    }
}
