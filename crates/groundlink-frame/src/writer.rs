use std::io::{ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use groundlink_transport::LinkStream;

use crate::codec::{encode_frame, LengthFraming};
use crate::error::{transport_to_frame_error, FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    framing: LengthFraming,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T, framing: LengthFraming) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            framing,
        }
    }

    /// Fill in the framing fields of `payload` and send it (blocking).
    ///
    /// Nothing is written when the framing fields cannot be filled.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(payload, &self.framing, &mut self.buf)?;
        let frame = std::mem::take(&mut self.buf);
        let result = self.write_all(&frame);
        self.buf = frame;
        result
    }

    /// Send bytes exactly as given, bypassing framing.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn framing(&self) -> &LengthFraming {
        &self.framing
    }
}

impl FrameWriter<LinkStream> {
    /// Frame writer for a link, with the framing validated and the write timeout applied.
    pub fn for_link(
        inner: LinkStream,
        framing: LengthFraming,
        write_timeout: Option<Duration>,
    ) -> Result<Self> {
        framing.validate()?;
        inner
            .set_write_timeout(write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner, framing))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::codec::decode_frame;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn frames_are_written_back_to_back() {
        let framing = LengthFraming::default();
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()), framing.clone());

        writer.write_frame(&[0, 0, 0x01]).unwrap();
        writer.write_frame(&[0, 0, 0x02, 0x03]).unwrap();

        let mut wire = written(writer);
        assert_eq!(wire.as_ref(), &[0, 3, 0x01, 0, 4, 0x02, 0x03]);
        assert_eq!(decode_frame(&mut wire, &framing).unwrap().unwrap().len(), 3);
        assert_eq!(decode_frame(&mut wire, &framing).unwrap().unwrap().len(), 4);
    }

    #[test]
    fn raw_bytes_skip_framing() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()), LengthFraming::default());
        writer.write_raw(&[0xDE, 0xAD]).unwrap();
        assert_eq!(written(writer).as_ref(), &[0xDE, 0xAD]);
    }

    #[test]
    fn unfillable_length_writes_nothing() {
        let framing = LengthFraming::new(0, 8, 0);
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()), framing);

        let err = writer.write_frame(&[0u8; 300]).unwrap_err();
        assert!(matches!(err, FrameError::Encode(_)));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn flush_follows_every_frame() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink, LengthFraming::default());

        writer.write_frame(&[0, 0]).unwrap();

        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(writer.get_ref().data, vec![0, 2]);
    }

    #[test]
    fn interrupted_write_and_flush_retry() {
        let mut writer = FrameWriter::new(InterruptedOnce::default(), LengthFraming::default());
        writer.write_frame(&[0, 0, 0x7F]).unwrap();
        assert_eq!(writer.into_inner().data, vec![0, 3, 0x7F]);
    }

    #[test]
    fn write_timeout_surfaces() {
        let mut writer = FrameWriter::new(TimedOutWriter, LengthFraming::default());
        let err = writer.write_frame(&[0, 0]).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter, LengthFraming::default());
        let err = writer.write_frame(&[0, 0]).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    #[cfg(unix)]
    fn for_link_applies_write_timeout() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let writer = FrameWriter::for_link(
            LinkStream::from_unix(left),
            LengthFraming::default(),
            Some(Duration::from_millis(10)),
        );
        assert!(writer.is_ok());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InterruptedOnce {
        write_interrupted: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.write_interrupted {
                self.write_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            // Accept one byte at a time to exercise the write loop.
            self.data.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct TimedOutWriter;

    impl Write for TimedOutWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
