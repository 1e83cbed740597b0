use tracing::{info, warn};

use crate::error::ConnectionError;
use crate::state::ConnectionState;

/// Receives connection state changes and errors, so a supervisor outside the
/// interface can decide when to reconnect.
pub trait ConnectionSink: Send + Sync {
    fn state_changed(&self, interface: &str, from: ConnectionState, to: ConnectionState);

    fn connection_error(&self, interface: &str, error: &ConnectionError);
}

/// Reports connection events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConnectionSink;

impl ConnectionSink for TracingConnectionSink {
    fn state_changed(&self, interface: &str, from: ConnectionState, to: ConnectionState) {
        info!(interface = %interface, %from, %to, "connection state changed");
    }

    fn connection_error(&self, interface: &str, err: &ConnectionError) {
        warn!(interface = %interface, error = %err, "connection error");
    }
}
