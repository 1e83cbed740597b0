use std::fmt;
use std::io;

use groundlink::interface::ConnectionError;
use groundlink::frame::FrameError;
use groundlink::transport::TransportError;
use groundlink::GroundError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::Decode(_)
        | FrameError::Encode(_)
        | FrameError::LengthTooLarge { .. }
        | FrameError::InvalidLength { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Establish { source, .. } | ConnectionError::Transport(source) => {
            transport_error(context, source)
        }
        ConnectionError::Frame(err) => frame_error(context, err),
        ConnectionError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ConnectionError::UnknownPacket(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ConnectionError::Packet(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConnectionError::NotConnected(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn ground_error(context: &str, err: GroundError) -> CliError {
    match err {
        GroundError::Connection(err) => connection_error(context, err),
        GroundError::Frame(err) => frame_error(context, err),
        GroundError::Io { source, .. } => io_error(context, source),
        GroundError::UnknownPacket(_)
        | GroundError::NoInterface(_)
        | GroundError::NotWhitelisted(_)
        | GroundError::InvalidParams { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        GroundError::Json(_)
        | GroundError::Definition(_)
        | GroundError::MissingDefaultSet { .. }
        | GroundError::InvalidValue { .. }
        | GroundError::DuplicateInterface(_)
        | GroundError::Packet(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = frame_error("read", FrameError::Io(io::Error::from(io::ErrorKind::WouldBlock)));
        assert_eq!(err.code, TIMEOUT);

        let err = connection_error(
            "read",
            ConnectionError::Timeout {
                interface: "INST_INT".to_string(),
                source: FrameError::Io(io::Error::from(io::ErrorKind::TimedOut)),
            },
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn refused_connect_is_a_transport_error() {
        let err = connection_error(
            "connect",
            ConnectionError::Establish {
                interface: "INST_INT".to_string(),
                source: TransportError::Connect {
                    endpoint: "127.0.0.1:1".to_string(),
                    source: io::Error::from(io::ErrorKind::ConnectionRefused),
                },
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("connect: "));
    }

    #[test]
    fn station_errors_are_invalid_data() {
        let err = ground_error(
            "load",
            GroundError::MissingDefaultSet {
                packet: "INST HEALTH".to_string(),
                item: "TEMP".to_string(),
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert_eq!(
            ground_error("send", GroundError::NoInterface("INST".to_string())).code,
            USAGE
        );
    }
}
