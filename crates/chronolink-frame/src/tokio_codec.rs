//! `tokio_util::codec` adapter for link frames.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::assembler::{CompleteFrame, LinkFramer};
use crate::codec::FrameConfig;
use crate::error::FrameError;

/// Decodes reassembled frames and encodes fragmented ones for `Framed` I/O.
#[derive(Debug, Default)]
pub struct LinkCodec {
    framer: LinkFramer,
}

impl LinkCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            framer: LinkFramer::with_config(config),
        }
    }
}

impl Decoder for LinkCodec {
    type Item = CompleteFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let incoming = src.split();
            self.framer.extend(&incoming);
        }
        Ok(self.framer.next_frame())
    }
}

impl Encoder<CompleteFrame> for LinkCodec {
    type Error = FrameError;

    fn encode(&mut self, item: CompleteFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.framer
            .encode(item.slot, item.kind, &item.payload, dst)
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::kind::{COMMAND, REPLY};

    #[test]
    fn decoder_handles_split_input() {
        let mut wire = BytesMut::new();
        LinkCodec::new()
            .encode(CompleteFrame::new(1, COMMAND, vec![3u8; 400]), &mut wire)
            .expect("encode");

        let mut codec = LinkCodec::new();
        let mut first = BytesMut::from(&wire[..100]);
        assert!(codec.decode(&mut first).expect("decode").is_none());
        assert!(first.is_empty(), "input is consumed into the framer");

        let mut rest = BytesMut::from(&wire[100..]);
        let frame = codec
            .decode(&mut rest)
            .expect("decode")
            .expect("complete");
        assert_eq!(frame.payload.len(), 400);
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(4096);
        let mut sink = FramedWrite::new(client, LinkCodec::new());
        let mut stream = FramedRead::new(server, LinkCodec::new());

        sink.send(CompleteFrame::new(0, COMMAND, b"cmd".to_vec()))
            .await
            .expect("send cmd");
        sink.send(CompleteFrame::new(0, REPLY, vec![9u8; 700]))
            .await
            .expect("send reply");

        let first = stream.next().await.expect("first").expect("decode");
        let second = stream.next().await.expect("second").expect("decode");
        assert_eq!(first.payload.as_ref(), b"cmd");
        assert_eq!(second.kind, REPLY);
        assert_eq!(second.payload.len(), 700);
    }
}
