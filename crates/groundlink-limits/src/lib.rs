//! Limits monitoring.
//!
//! Each telemetry item with limits is classified against its thresholds on
//! every packet. Classifications become the confirmed [`LimitsState`] only
//! after `persistence` consecutive observations, except RED classifications
//! which confirm at once. Confirmed transitions run the item's
//! [`LimitsResponse`] synchronously; response failures are reported to a
//! [`FailureSink`] and never stop processing.
//!
//! [`LimitsGroup`]s gate evaluation of sets of items from a predicate that
//! a background task re-evaluates periodically.

pub mod control;
pub mod engine;
pub mod error;
pub mod group;
pub mod response;
pub mod state;

pub use control::{ItemKey, LimitsControl};
pub use engine::{LimitsCheck, LimitsEngine, LimitsTransition};
pub use error::ResponseError;
pub use group::{LimitsGroup, LimitsGroupConfig, LimitsGroups};
pub use response::{FailureSink, LimitsResponse, TracingFailureSink};
pub use state::{classify, ItemLimitsState, LimitsState};
