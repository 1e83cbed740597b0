//! Length-field framing for ground link byte streams.
//!
//! Hardware and simulators send packets back to back on a stream. Each packet
//! carries its own length somewhere in its header:
//! - an unsigned field at a configurable bit offset and size
//! - scaled by `bytes_per_count` and adjusted by `length_value_offset`
//! - optionally preceded by a sync pattern that marks the start of a frame
//!
//! [`FrameReader`] turns a stream into whole frames and [`FrameWriter`] fills
//! in the length field of outbound ones. Enable the `async` feature for a
//! `tokio_util` codec over the same rules.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::LengthCodec;
pub use codec::{decode_frame, encode_frame, LengthFraming};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
