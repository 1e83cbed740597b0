use crate::types::DataType;

/// Field layout problems shared by reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// The bit size is not valid for the data type.
    #[error("invalid bit_size {bit_size} for {data_type}")]
    InvalidBitSize { bit_size: u32, data_type: DataType },

    /// Floats, strings and blocks must start on a byte boundary.
    #[error("{data_type} at bit_offset {bit_offset} is not byte aligned")]
    Unaligned { bit_offset: i32, data_type: DataType },

    /// A zero bit size cannot be combined with a negative offset.
    #[error("bit_size 0 requires a non-negative bit_offset (got {bit_offset})")]
    VariableSizeNegativeOffset { bit_offset: i32 },

    /// The field would begin before the first byte of the buffer.
    #[error("bit_offset {bit_offset} with bit_size {bit_size} starts before the buffer ({buffer_len} bytes)")]
    BeforeStart {
        bit_offset: i32,
        bit_size: u32,
        buffer_len: usize,
    },
}

/// Errors returned by [`crate::read`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Invalid field layout.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The field extends past the end of the buffer.
    #[error("bit_offset {bit_offset} with bit_size {bit_size} reads beyond buffer of {buffer_len} bytes")]
    OutOfBounds {
        bit_offset: i32,
        bit_size: u32,
        buffer_len: usize,
    },
}

/// Errors returned by [`crate::write`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Invalid field layout.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// The value does not fit the field and the overflow policy is strict.
    #[error("value {value} does not fit in a {bit_size}-bit {data_type} field")]
    Overflow {
        value: String,
        bit_size: u32,
        data_type: DataType,
    },

    /// The value kind cannot be stored in this field.
    #[error("cannot write a {found} value to a {expected} field")]
    TypeMismatch {
        expected: DataType,
        found: &'static str,
    },

    /// Text that should have held a number did not parse.
    #[error("invalid numeric text {text:?}")]
    InvalidNumber { text: String },

    /// A string or block is longer than its fixed-size field.
    #[error("value of {len} bytes exceeds {size}-byte field")]
    ValueTooLong { len: usize, size: usize },
}
