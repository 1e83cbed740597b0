use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, LengthFraming};
use crate::error::FrameError;

/// `tokio_util` codec over [`LengthFraming`], for use with `Framed`.
#[derive(Debug, Clone, Default)]
pub struct LengthCodec {
    framing: LengthFraming,
}

impl LengthCodec {
    pub fn new(framing: LengthFraming) -> Result<Self, FrameError> {
        framing.validate()?;
        Ok(Self { framing })
    }

    pub fn framing(&self) -> &LengthFraming {
        &self.framing
    }
}

impl Decoder for LengthCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, &self.framing)
    }
}

impl Encoder<&[u8]> for LengthCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(payload, &self.framing, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn frames_round_trip_through_framed_io() {
        let codec = LengthCodec::new(LengthFraming::new(0, 32, 4)).unwrap();

        let mut sink = FramedWrite::new(Vec::new(), codec.clone());
        sink.send(&[0u8, 0, 0, 0, 1, 2, 3, 4, 5, 6][..]).await.unwrap();
        sink.send(&[0u8, 0, 0, 0, 9][..]).await.unwrap();
        let wire = sink.into_inner();
        assert_eq!(&wire[..4], &[0, 0, 0, 6]);

        let mut stream = FramedRead::new(&wire[..], codec);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[4..], &[1, 2, 3, 4, 5, 6]);
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(&second[4..], &[9]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let codec = LengthCodec::default();
        let wire = [0x00u8, 0x08, 0x01];
        let mut stream = FramedRead::new(&wire[..], codec);
        assert!(stream.next().await.unwrap().is_err());
    }

    #[test]
    fn rejects_invalid_framing() {
        let framing = LengthFraming {
            bytes_per_count: 0,
            ..LengthFraming::default()
        };
        assert!(LengthCodec::new(framing).is_err());
    }
}
