//! Bit-level binary codec for telemetry and command buffers.
//!
//! Every telemetry item and command parameter is a field somewhere inside a
//! packet buffer, described by:
//! - a bit offset (negative offsets count back from the end of the buffer)
//! - a bit size (zero means "to the end of the buffer" for strings and blocks)
//! - a data type and an endianness
//!
//! [`read`] extracts a typed [`Value`] from such a field and [`write`] packs one
//! back in, growing the buffer when the field lies past its current end.

pub mod accessor;
pub mod error;
pub mod types;

pub use accessor::{read, read_zero_filled, validate, write};
pub use error::{DecodeError, EncodeError, FieldError};
pub use types::{DataType, Endianness, OverflowPolicy, Value};
