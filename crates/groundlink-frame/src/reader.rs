use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::BytesMut;
use groundlink_transport::LinkStream;

use crate::codec::{decode_frame, LengthFraming};
use crate::error::{transport_to_frame_error, FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Bytes are accumulated until a whole frame is available, so callers never
/// see a partial frame. Bytes past the returned frame stay buffered.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    framing: LengthFraming,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T, framing: LengthFraming) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            framing,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached. A read
    /// timeout surfaces as `FrameError::Io` and leaves buffered bytes intact.
    pub fn read_frame(&mut self) -> Result<BytesMut> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, &self.framing)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
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

impl FrameReader<LinkStream> {
    /// Frame reader for a link, with the framing validated and the read timeout applied.
    pub fn for_link(
        inner: LinkStream,
        framing: LengthFraming,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        framing.validate()?;
        inner
            .set_read_timeout(read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner, framing))
    }
}
