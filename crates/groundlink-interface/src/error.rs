use groundlink_frame::FrameError;
use groundlink_packet::{PacketError, PacketIdentity};
use groundlink_task::TaskError;
use groundlink_transport::TransportError;

/// Errors that can occur on an interface connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The transport could not be established; the interface is CLOSED.
    #[error("{interface}: connection failed: {source}")]
    Establish {
        interface: String,
        #[source]
        source: TransportError,
    },

    /// The operation needs a CONNECTED interface.
    #[error("{0}: not connected")]
    NotConnected(String),

    /// `connect` was called on an interface that is not CLOSED.
    #[error("{0}: already connected")]
    AlreadyConnected(String),

    /// Framing failure; the connection was closed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport failure outside of establishment.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A read or write timed out; the connection was closed.
    #[error("{interface}: timed out: {source}")]
    Timeout {
        interface: String,
        #[source]
        source: FrameError,
    },

    /// No command definition exists for the requested packet.
    #[error("unknown packet {0}")]
    UnknownPacket(PacketIdentity),

    /// The outbound packet could not be built.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// The polling task could not be scheduled.
    #[error("polling task: {0}")]
    Task(#[from] TaskError),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
