use groundlink_packet::{Packet, PacketError};
use tracing::{error, warn};

use crate::control::ItemKey;
use crate::error::ResponseError;
use crate::state::LimitsState;

/// Action taken when an item's confirmed limits state changes.
///
/// Runs synchronously on the thread delivering the packet, so it must not
/// block. The current state is available from the engine; `previous_state`
/// is the state being left.
pub trait LimitsResponse: Send + Sync {
    fn handle(
        &self,
        packet: &Packet,
        item_name: &str,
        previous_state: LimitsState,
    ) -> Result<(), ResponseError>;
}

impl<F> LimitsResponse for F
where
    F: Fn(&Packet, &str, LimitsState) -> Result<(), ResponseError> + Send + Sync,
{
    fn handle(
        &self,
        packet: &Packet,
        item_name: &str,
        previous_state: LimitsState,
    ) -> Result<(), ResponseError> {
        self(packet, item_name, previous_state)
    }
}

/// Receives failures the limits engine recovers from.
pub trait FailureSink: Send + Sync {
    /// A response returned an error or panicked.
    fn response_failed(&self, item: &ItemKey, error: &ResponseError);

    /// An item could not be read or is not numeric, so it was not classified.
    fn read_failed(&self, item: &ItemKey, error: &PacketError);
}

/// Reports limits failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn response_failed(&self, item: &ItemKey, err: &ResponseError) {
        error!(item = %item, error = %err, "limits response failed");
    }

    fn read_failed(&self, item: &ItemKey, err: &PacketError) {
        warn!(item = %item, error = %err, "limits item not evaluated");
    }
}
