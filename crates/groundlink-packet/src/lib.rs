//! Packet definitions and packet instances.
//!
//! A [`PacketDefinition`] is an immutable, named layout of items shared by
//! every buffer of that packet type. A [`Packet`] binds one buffer to a
//! definition and reads or writes its items in one of four representations
//! ([`ValueType`]): raw, converted, formatted, or formatted with units.
//!
//! Definitions live in a [`DefinitionTable`] keyed by [`PacketIdentity`].

pub mod conversion;
pub mod definition;
pub mod error;
pub mod format;
pub mod item;
pub mod limits;
pub mod packet;
pub mod table;

pub use conversion::{
    Conversion, FnConversion, PolynomialConversion, Segment, SegmentedPolynomialConversion,
};
pub use definition::{PacketDefinition, PacketIdentity, PacketLength};
pub use error::{ConversionError, DefinitionError, LimitsConfigError, PacketError, Result};
pub use format::{format_value, FormatError};
pub use item::{ItemDefinition, ItemState};
pub use limits::{LimitsDefinition, Thresholds, DEFAULT_LIMITS_SET};
pub use packet::{Packet, ValueType};
pub use table::DefinitionTable;

pub use groundlink_codec::{DataType, Endianness, OverflowPolicy, Value};
