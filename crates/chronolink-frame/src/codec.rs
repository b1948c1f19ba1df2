use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::assembler::ReassemblyPolicy;
use crate::error::{FrameError, Result};

/// Link header: delimiter (2) + length (2) + slot + type + index + more = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Frame delimiter.
pub const DELIMITER: [u8; 2] = [0xAB, 0xCD];

/// Default maximum payload chunk per fragment.
pub const MAX_CHUNK: usize = 242;

/// Fragment indices are a single byte.
pub const MAX_FRAGMENTS: usize = 256;

/// One link-layer fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFrame {
    /// Slot / packet-kind byte.
    pub slot: u8,
    /// Link frame type (see [`crate::kind`]).
    pub kind: u8,
    /// Position of this fragment within its logical frame, starting at 0.
    pub index: u8,
    /// False only on the final fragment.
    pub more: bool,
    /// This fragment's chunk of the logical payload.
    pub payload: Bytes,
}

impl LinkFrame {
    /// The total wire size of this fragment (header + chunk).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode one fragment into the wire format.
///
/// ```text
/// ┌───────────┬──────────┬──────┬──────┬───────┬──────┬─────────────┐
/// │ 0xAB 0xCD │ len (LE) │ slot │ type │ index │ more │ chunk       │
/// │ 2B        │ 2B       │ 1B   │ 1B   │ 1B    │ 1B   │ (len bytes) │
/// └───────────┴──────────┴──────┴──────┴───────┴──────┴─────────────┘
/// ```
pub fn encode_fragment(frame: &LinkFrame, dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(frame.payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: frame.payload.len(),
        max: u16::MAX as usize,
    })?;
    dst.reserve(frame.wire_size());
    dst.put_slice(&DELIMITER);
    dst.put_u16_le(len);
    dst.put_u8(frame.slot);
    dst.put_u8(frame.kind);
    dst.put_u8(frame.index);
    dst.put_u8(u8::from(frame.more));
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Split `payload` into fragments of at most `max_chunk` bytes.
///
/// Produces `ceil(len / max_chunk)` fragments; an empty payload still
/// produces one empty, final fragment so the receiver sees the frame.
pub fn fragment(slot: u8, kind: u8, payload: &[u8], max_chunk: usize) -> Result<Vec<LinkFrame>> {
    if max_chunk == 0 || max_chunk > u16::MAX as usize {
        return Err(FrameError::InvalidChunkSize(max_chunk));
    }

    let needed = payload.len().div_ceil(max_chunk).max(1);
    if needed > MAX_FRAGMENTS {
        return Err(FrameError::TooManyFragments {
            needed,
            max: MAX_FRAGMENTS,
        });
    }

    if payload.is_empty() {
        return Ok(vec![LinkFrame {
            slot,
            kind,
            index: 0,
            more: false,
            payload: Bytes::new(),
        }]);
    }

    let payload = Bytes::copy_from_slice(payload);
    let frames = (0..needed)
        .map(|i| {
            let start = i * max_chunk;
            let end = (start + max_chunk).min(payload.len());
            LinkFrame {
                slot,
                kind,
                index: i as u8,
                more: i + 1 < needed,
                payload: payload.slice(start..end),
            }
        })
        .collect();
    Ok(frames)
}

/// Fragment `payload` and encode every fragment into `dst`.
///
/// Returns the number of fragments written.
pub fn encode_frames(
    slot: u8,
    kind: u8,
    payload: &[u8],
    max_chunk: usize,
    dst: &mut BytesMut,
) -> Result<usize> {
    let frames = fragment(slot, kind, payload, max_chunk)?;
    for frame in &frames {
        encode_fragment(frame, dst)?;
    }
    Ok(frames.len())
}

/// Decode the next fragment from a buffer.
///
/// Bytes that do not start a plausible header are skipped one at a time.
/// Returns `None` when the buffer does not yet hold a complete fragment; the
/// partial bytes stay in `src` for the next call.
pub fn decode_fragment(src: &mut BytesMut, max_chunk: usize) -> Option<LinkFrame> {
    loop {
        if !resync(src) || src.len() < HEADER_SIZE {
            return None;
        }

        let len = u16::from_le_bytes([src[2], src[3]]) as usize;
        if len > max_chunk {
            trace!(len, max_chunk, "implausible fragment length; resyncing");
            src.advance(1);
            continue;
        }

        if src.len() < HEADER_SIZE + len {
            return None;
        }

        let slot = src[4];
        let kind = src[5];
        let index = src[6];
        let more = src[7] != 0;
        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).freeze();

        return Some(LinkFrame {
            slot,
            kind,
            index,
            more,
            payload,
        });
    }
}

/// Drop leading bytes until `src` starts with the delimiter.
///
/// Returns false if no delimiter start is available yet. A lone trailing
/// `0xAB` is kept since its partner may still be on the way.
fn resync(src: &mut BytesMut) -> bool {
    let mut skipped = 0usize;
    while !src.is_empty() {
        if src.len() == 1 {
            if src[0] == DELIMITER[0] {
                break;
            }
        } else if src[..2] == DELIMITER {
            break;
        }
        src.advance(1);
        skipped += 1;
    }
    if skipped > 0 {
        trace!(skipped, "skipped bytes before delimiter");
    }
    src.len() >= DELIMITER.len()
}

/// Configuration for the link framer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload chunk per fragment. Default: 242 bytes.
    pub max_chunk: usize,
    /// Largest reassembled frame accepted. Default: 256 full chunks.
    pub max_frame_size: usize,
    /// How fragment indices are checked during reassembly.
    pub reassembly: ReassemblyPolicy,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_chunk: MAX_CHUNK,
            max_frame_size: MAX_CHUNK * MAX_FRAGMENTS,
            reassembly: ReassemblyPolicy::Strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian_chunk_length() {
        let frame = LinkFrame {
            slot: 3,
            kind: crate::kind::COMMAND,
            index: 1,
            more: true,
            payload: Bytes::from_static(&[0x11; 0x0102]),
        };
        let mut buf = BytesMut::new();
        encode_fragment(&frame, &mut buf).expect("encode");

        assert_eq!(&buf[..HEADER_SIZE], &[0xAB, 0xCD, 0x02, 0x01, 3, 1, 1, 1]);
        assert_eq!(buf.len(), frame.wire_size());
    }

    #[test]
    fn fragment_count_is_ceiling_of_chunks() {
        for (len, expected) in [(1, 1), (242, 1), (243, 2), (484, 2), (485, 3), (1000, 5)] {
            let payload = vec![0u8; len];
            let frames = fragment(0, 0, &payload, MAX_CHUNK).expect("fragment");
            assert_eq!(frames.len(), expected, "payload of {len} bytes");
        }
    }

    #[test]
    fn fragments_are_indexed_and_flagged() {
        let payload: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let frames = fragment(1, 2, &payload, MAX_CHUNK).expect("fragment");

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index as usize, i);
            assert_eq!(frame.more, i < 2);
        }
        assert_eq!(frames[0].payload.len(), 242);
        assert_eq!(frames[1].payload.len(), 242);
        assert_eq!(frames[2].payload.len(), 116);

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();
        assert_eq!(joined, payload);
    }

    #[test]
    fn empty_payload_is_one_final_fragment() {
        let frames = fragment(0, 0, b"", MAX_CHUNK).expect("fragment");
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].more);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn oversized_payload_needs_too_many_fragments() {
        let payload = vec![0u8; MAX_CHUNK * MAX_FRAGMENTS + 1];
        let err = fragment(0, 0, &payload, MAX_CHUNK).expect_err("too big");
        assert!(matches!(err, FrameError::TooManyFragments { .. }));
    }

    #[test]
    fn zero_chunk_is_rejected() {
        let err = fragment(0, 0, b"x", 0).expect_err("zero chunk");
        assert!(matches!(err, FrameError::InvalidChunkSize(0)));
    }

    #[test]
    fn decode_waits_for_complete_fragment() {
        let mut wire = BytesMut::new();
        encode_frames(0, 1, b"hello", MAX_CHUNK, &mut wire).expect("encode");
        let full = wire.clone();

        let mut partial = BytesMut::from(&full[..HEADER_SIZE + 2]);
        assert!(decode_fragment(&mut partial, MAX_CHUNK).is_none());
        assert_eq!(partial.len(), HEADER_SIZE + 2, "partial bytes are kept");

        partial.extend_from_slice(&full[HEADER_SIZE + 2..]);
        let frame = decode_fragment(&mut partial, MAX_CHUNK).expect("complete now");
        assert_eq!(frame.payload.as_ref(), b"hello");
        assert!(partial.is_empty());
    }

    #[test]
    fn decode_skips_garbage_before_delimiter() {
        let mut wire = BytesMut::from(&[0x00, 0xAB, 0x12, 0xCD, 0xFF][..]);
        encode_frames(5, 2, b"ok", MAX_CHUNK, &mut wire).expect("encode");

        let frame = decode_fragment(&mut wire, MAX_CHUNK).expect("resynced");
        assert_eq!(frame.slot, 5);
        assert_eq!(frame.kind, 2);
        assert_eq!(frame.payload.as_ref(), b"ok");
        assert!(wire.is_empty());
    }

    #[test]
    fn decode_keeps_trailing_delimiter_half() {
        let mut wire = BytesMut::from(&[0x01, 0x02, 0xAB][..]);
        assert!(decode_fragment(&mut wire, MAX_CHUNK).is_none());
        assert_eq!(wire.as_ref(), &[0xAB]);
    }

    #[test]
    fn decode_resyncs_past_implausible_length() {
        let mut wire = BytesMut::from(&[0xAB, 0xCD, 0xFF, 0xFF, 0, 0, 0, 0][..]);
        encode_frames(0, 0, b"real", MAX_CHUNK, &mut wire).expect("encode");

        let frame = decode_fragment(&mut wire, MAX_CHUNK).expect("resynced");
        assert_eq!(frame.payload.as_ref(), b"real");
    }
}
