//! Byte-stream transports for ground links.
//!
//! Provides one connected stream type, [`LinkStream`], over the transports a
//! ground station talks to hardware or simulators with:
//! - TCP client and server sockets
//! - Unix domain sockets (Linux/macOS)
//!
//! Everything above this layer (framing, connection lifecycle) works on
//! `LinkStream` and never sees the concrete socket.

pub mod config;
pub mod error;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use stream::LinkStream;
pub use tcp::TcpServer;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
