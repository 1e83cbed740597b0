use std::path::PathBuf;

use groundlink_frame::FrameError;
use groundlink_interface::ConnectionError;
use groundlink_packet::{DefinitionError, PacketError, PacketIdentity};
use groundlink_task::TaskError;

/// Errors surfaced by the ground context, its entry points and station files.
#[derive(Debug, thiserror::Error)]
pub enum GroundError {
    /// The method is not exposed to remote callers.
    #[error("method {0} is not whitelisted")]
    NotWhitelisted(String),

    /// No command or telemetry definition with this identity.
    #[error("unknown packet {0}")]
    UnknownPacket(PacketIdentity),

    /// No registered interface serves this target.
    #[error("no interface for target {0}")]
    NoInterface(String),

    /// Parameters of an entry point call are malformed.
    #[error("invalid parameters for {method}: {reason}")]
    InvalidParams { method: String, reason: String },

    /// Limits on an item in a station file have no DEFAULT set.
    #[error("{packet}: item {item}: limits need a DEFAULT set")]
    MissingDefaultSet { packet: String, item: String },

    /// A value in a station file cannot be used for its item.
    #[error("{packet}: item {item}: {reason}")]
    InvalidValue {
        packet: String,
        item: String,
        reason: String,
    },

    /// Two interfaces in a station file share a name.
    #[error("duplicate interface {0}")]
    DuplicateInterface(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A link thread could not be started.
    #[error("failed to spawn link thread for {interface}: {source}")]
    Spawn {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

pub type Result<T> = std::result::Result<T, GroundError>;
