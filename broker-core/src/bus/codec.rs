use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use super::error::BusError;
use super::message::Frame;

/// Upper bound for a single bus frame.
pub const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// JSON frames behind a big-endian `u32` length prefix.
pub struct BusCodec {
    inner: LengthDelimitedCodec,
}

impl Default for BusCodec {
    fn default() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Decoder for BusCodec {
    type Item = Frame;
    type Error = BusError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(buf) => Ok(Some(serde_json::from_slice(&buf)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for BusCodec {
    type Error = BusError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = serde_json::to_vec(&frame)?;
        self.inner.encode(Bytes::from(data), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::{MethodReturn, PamHandlerReply};

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let mut codec = BusCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::Return {
                    reply_serial: 9,
                    body: MethodReturn::Pam(PamHandlerReply {
                        pam_status: 0,
                        domain: "LOCAL".to_string(),
                    }),
                },
                &mut buf,
            )
            .unwrap();

        let mut partial = buf.split_to(buf.len() - 3);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert!(matches!(frame, Frame::Return { reply_serial: 9, .. }));
    }

    #[test]
    fn test_garbage_payload_is_codec_error() {
        let mut codec = BusCodec::default();
        let mut buf = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"not json"), &mut buf)
            .unwrap();
        assert!(matches!(codec.decode(&mut buf), Err(BusError::Codec(_))));
    }
}
