use groundlink_codec::{DecodeError, EncodeError};

/// Errors that can occur while extracting or building frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field could not be read.
    #[error("cannot read length field: {0}")]
    Decode(#[from] DecodeError),

    /// The length field could not be written.
    #[error("cannot write length field: {0}")]
    Encode(#[from] EncodeError),

    /// The framing parameters are unusable.
    #[error("invalid framing configuration: {0}")]
    InvalidConfig(String),

    /// The length field holds more than the configured maximum.
    #[error("length field value {length} exceeds maximum {max}")]
    LengthTooLarge { length: u64, max: u64 },

    /// The length field and the frame size disagree: the decoded frame is too
    /// short to hold its own header, or an outbound frame size is not a whole
    /// number of counts.
    #[error("length field value {length} does not fit a {frame_length}-byte frame (minimum {minimum})")]
    InvalidLength {
        length: u64,
        frame_length: i128,
        minimum: usize,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this is a read or write timeout on a stream with timeouts set.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Io(err) if matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Fold a transport failure into the frame layer's I/O error.
pub(crate) fn transport_to_frame_error(err: groundlink_transport::TransportError) -> FrameError {
    use groundlink_transport::TransportError;
    match err {
        TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
        TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
