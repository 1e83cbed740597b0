//! Telemetry and command ground-station core.
//!
//! Raw bytes from hardware links become typed telemetry values, are checked
//! against limits, and structured commands become bytes again.
//!
//! # Crate Structure
//!
//! - [`codec`]: Bit-level reads and writes of integers, floats, strings and blocks
//! - [`packet`]: Packet definitions, conversions, states and limits definitions
//! - [`frame`]: Length-field framing of byte streams
//! - [`transport`]: TCP and Unix domain socket links
//! - [`interface`]: Connection lifecycle, identification and polling
//! - [`limits`]: Debounced limits monitoring and limits groups
//! - [`task`]: Cancellable periodic background tasks
//!
//! [`GroundContext`] ties these together for a running station, [`LinkThread`]
//! drives one interface, and [`Api`] exposes the `cmd`/`tlm` entry points.

pub mod api;
pub mod config;
pub mod context;
pub mod current;
pub mod error;
pub mod link;

pub use api::{is_whitelisted, Api, METHOD_WHITELIST};
pub use config::{Station, StationConfig};
pub use context::GroundContext;
pub use current::CurrentValueTable;
pub use error::{GroundError, Result};
pub use link::{LinkBuilder, LinkThread, PacketObserver};

/// Re-export codec types.
pub mod codec {
    pub use groundlink_codec::*;
}

/// Re-export packet types.
pub mod packet {
    pub use groundlink_packet::*;
}

/// Re-export frame types.
pub mod frame {
    pub use groundlink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use groundlink_transport::*;
}

/// Re-export interface types.
pub mod interface {
    pub use groundlink_interface::*;
}

/// Re-export limits types.
pub mod limits {
    pub use groundlink_limits::*;
}

/// Re-export task types.
pub mod task {
    pub use groundlink_task::*;
}
