use groundlink_codec::{DecodeError, EncodeError, FieldError};

use crate::format::FormatError;
use crate::packet::ValueType;

/// Errors raised while building a [`crate::PacketDefinition`].
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Target or packet name is empty.
    #[error("packet definitions need a target and a packet name")]
    EmptyName,

    /// Two items share a (case-insensitive) name.
    #[error("{packet}: duplicate item name {name}")]
    DuplicateItem { packet: String, name: String },

    /// More than one item has a zero bit size.
    #[error("{packet}: more than one variable-size item ({first}, {second})")]
    MultipleVariableItems {
        packet: String,
        first: String,
        second: String,
    },

    /// A variable-size item is followed by another item.
    #[error("{packet}: variable-size item {name} must be last but {following} starts after it")]
    VariableItemNotLast {
        packet: String,
        name: String,
        following: String,
    },

    /// The item layout is invalid for its data type.
    #[error("{packet}: item {name}: {source}")]
    InvalidItem {
        packet: String,
        name: String,
        source: FieldError,
    },

    /// The limits attached to an item are inconsistent.
    #[error("{packet}: item {name}: {source}")]
    InvalidLimits {
        packet: String,
        name: String,
        source: LimitsConfigError,
    },

    /// Limits were attached to a string or block item.
    #[error("{packet}: item {name}: limits require a numeric item")]
    LimitsOnNonNumeric { packet: String, name: String },

    /// An id or default value cannot be encoded into its item.
    #[error("{packet}: item {name}: {source}")]
    InvalidValue {
        packet: String,
        name: String,
        source: EncodeError,
    },
}

/// Errors raised while validating limits thresholds.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LimitsConfigError {
    /// A lower band boundary exceeds the next boundary up.
    #[error("limits set {set}: {lower_name} ({lower}) exceeds {upper_name} ({upper})")]
    Misordered {
        set: String,
        lower_name: &'static str,
        lower: f64,
        upper_name: &'static str,
        upper: f64,
    },

    /// Only one side of the green band was given.
    #[error("limits set {set}: green_low and green_high must be given together")]
    PartialGreenBand { set: String },

    /// A threshold is NaN or infinite.
    #[error("limits set {set}: {name} is not finite")]
    NonFinite { set: String, name: &'static str },

    /// Persistence must be at least one sample.
    #[error("limits persistence must be at least 1")]
    ZeroPersistence,

    /// Every limits definition needs a DEFAULT set.
    #[error("limits definition has no DEFAULT set")]
    MissingDefaultSet,
}

/// Errors raised by a [`crate::Conversion`].
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The conversion only applies to numbers.
    #[error("conversion requires a numeric value, got {0}")]
    NotNumeric(&'static str),

    /// A sibling item needed by the conversion could not be read.
    #[error("conversion input unavailable: {0}")]
    Input(#[from] Box<PacketError>),

    /// Any other failure reported by a custom conversion.
    #[error("{0}")]
    Failed(String),
}

/// Errors raised while reading or writing items of a [`crate::Packet`].
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// No item with this name exists in the packet.
    #[error("{packet}: no item named {item}")]
    UnknownItem { packet: String, item: String },

    /// The item could not be decoded from the buffer.
    #[error("failed to read {item}: {source}")]
    Decode { item: String, source: DecodeError },

    /// The value could not be encoded into the buffer.
    #[error("failed to write {item}: {source}")]
    Encode { item: String, source: EncodeError },

    /// A read or write conversion failed.
    #[error("conversion of {item} failed: {source}")]
    Conversion {
        item: String,
        source: ConversionError,
    },

    /// The item's format string could not render the value.
    #[error("failed to format {item}: {source}")]
    Format { item: String, source: FormatError },

    /// Formatted representations are display-only.
    #[error("{item} cannot be written as {value_type}")]
    UnsupportedWrite { item: String, value_type: ValueType },

    /// A text value named a state the item does not define.
    #[error("{item} has no state named {state}")]
    UnknownState { item: String, state: String },
}

pub type Result<T> = std::result::Result<T, PacketError>;
