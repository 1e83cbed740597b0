use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::LinkStream;

/// Listening TCP socket, for serving simulated links or accepting
/// connections from equipment that dials in.
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind and listen. Port 0 picks a free port; see [`TcpServer::local_addr`].
    pub fn bind(address: &str) -> Result<Self> {
        let bind_error = |source| TransportError::Bind {
            endpoint: address.to_string(),
            source,
        };
        let listener = TcpListener::bind(address).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        info!(%local_addr, "listening on tcp socket");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(LinkStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok((LinkStream::from_tcp(stream)?, peer))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Resolve `address` to its socket addresses.
pub(crate) fn resolve(address: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = address
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            endpoint: address.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(TransportError::Unresolved(address.to_string()));
    }
    Ok(addrs)
}
