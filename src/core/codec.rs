//! Frame encoder for `tokio_util` sinks.

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::config::MAX_FIELD_SIZE;
use crate::core::frame::Frame;
use crate::error::ProtocolError;

/// Frame encoder for `FramedWrite` sinks.
///
/// Each `Frame` is written whole into the sink buffer, so a single sink owner never
/// interleaves partial frames on the wire.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_field_len: u32,
}

impl FrameCodec {
    pub fn new(max_field_len: u32) -> Self {
        Self { max_field_len }
    }

    pub fn max_field_len(&self) -> u32 {
        self.max_field_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FIELD_SIZE)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst, self.max_field_len)
    }
}

impl Encoder<&Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst, self.max_field_len)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio_util::codec::FramedWrite;

    #[test]
    fn encoder_matches_frame_encoding() {
        let frame = Frame::command("status", "now");
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&frame, &mut buf).unwrap();
        assert_eq!(&buf[..], &frame.to_bytes().unwrap()[..]);
    }

    #[test]
    fn encoder_appends_consecutive_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Frame::text("a"), &mut buf).unwrap();
        codec.encode(Frame::text("b"), &mut buf).unwrap();
        assert_eq!(buf.len(), 2 * Frame::text("a").encoded_len());
    }

    #[tokio::test]
    async fn framed_write_emits_wire_bytes() {
        let mut out = Vec::new();
        {
            let mut sink = FramedWrite::new(&mut out, FrameCodec::default());
            sink.send(Frame::text("hello")).await.unwrap();
        }
        assert_eq!(out, Frame::text("hello").to_bytes().unwrap());
    }
}
