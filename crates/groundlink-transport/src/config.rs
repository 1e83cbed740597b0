use std::fmt;
use std::net::TcpStream;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;
use crate::tcp::resolve;

/// Where a link connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// TCP client to `host:port`.
    Tcp { address: String },
    /// Unix domain socket client to a filesystem path.
    Unix { path: PathBuf },
}

impl TransportConfig {
    /// Open a connection.
    ///
    /// For TCP every resolved address is tried in turn, each bounded by
    /// `timeout`. Unix domain socket connects are local and ignore it.
    pub fn connect(&self, timeout: Option<Duration>) -> Result<LinkStream> {
        match self {
            Self::Tcp { address } => {
                let mut last_error = None;
                for addr in resolve(address)? {
                    let attempt = match timeout {
                        Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                        None => TcpStream::connect(addr),
                    };
                    match attempt {
                        Ok(stream) => {
                            debug!(%addr, "connected to tcp endpoint");
                            return LinkStream::from_tcp(stream);
                        }
                        Err(err) => last_error = Some(err),
                    }
                }
                Err(TransportError::Connect {
                    endpoint: address.clone(),
                    source: last_error.unwrap_or_else(|| {
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no address to connect to")
                    }),
                })
            }
            #[cfg(unix)]
            Self::Unix { path } => crate::uds::UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Self::Unix { .. } => Err(TransportError::Unsupported("unix domain socket")),
        }
    }
}

impl fmt::Display for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { address } => write!(f, "tcp://{address}"),
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}
