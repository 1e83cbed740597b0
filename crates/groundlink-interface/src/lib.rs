//! Connections to targets.
//!
//! An [`Interface`] owns one framed stream: it connects, identifies inbound
//! frames against the telemetry definitions of its targets, sends command
//! packets, and optionally polls a command on a fixed interval. State changes
//! and errors go to a [`ConnectionSink`]; reconnecting is up to the caller.

pub mod config;
pub mod error;
pub mod hooks;
pub mod interface;
pub mod sink;
pub mod state;

pub use config::{InterfaceConfig, PollingConfig};
pub use error::{ConnectionError, Result};
pub use hooks::{HookChain, PacketHook};
pub use interface::{Interface, InterfaceHandle, InterfaceStats};
pub use sink::{ConnectionSink, TracingConnectionSink};
pub use state::ConnectionState;
