//! Cancellable background tasks.
//!
//! A [`TaskRunner`] schedules named units of blocking work on a tokio runtime,
//! either once after a delay or periodically. Each task gets a child
//! cancellation token; cancelling it stops the task after any in-flight
//! iteration. Failures and panics stop only the failing task and are reported
//! to a [`TaskSink`].

pub mod error;
pub mod runner;
pub mod sink;

pub use error::{Result, TaskError};
pub use runner::{TaskHandle, TaskRunner, TaskSchedule};
pub use sink::{TaskSink, TracingTaskSink};
