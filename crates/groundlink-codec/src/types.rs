use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// How the bits of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    /// Two's-complement signed integer, 1 to 64 bits.
    Int,
    /// Unsigned integer, 1 to 64 bits.
    Uint,
    /// IEEE-754 float, 32 or 64 bits.
    Float,
    /// Byte-aligned text, NUL terminated when shorter than its field.
    String,
    /// Byte-aligned opaque bytes.
    Block,
}

impl DataType {
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Uint)
    }

    pub fn is_numeric(self) -> bool {
        !self.is_bytes()
    }

    /// Strings and blocks.
    pub fn is_bytes(self) -> bool {
        matches!(self, Self::String | Self::Block)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Uint => "UINT",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Block => "BLOCK",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte order of multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// What a write does with a value that does not fit its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverflowPolicy {
    /// Reject the write.
    #[default]
    Error,
    /// Reject, except that signed fields also accept their unsigned bit
    /// pattern (e.g. `0xFF` in an 8-bit INT).
    ErrorAllowHex,
    /// Keep only the low-order bits (or leading bytes for strings and blocks).
    Truncate,
    /// Clamp to the nearest representable value.
    Saturate,
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Block(Bytes),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Uint(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::String(_) | Self::Block(_) => None,
        }
    }

    /// Integral view of the value. Floats only qualify when they hold a whole number.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(i128::from(*v)),
            Self::Uint(v) => Some(i128::from(*v)),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i128),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Raw bytes of a string or block.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::String(s) => Some(s.as_bytes()),
            Self::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Uint(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Block(_) => "block",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::Block(bytes) => {
                for (index, byte) in bytes.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Uint(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Uint(u64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Block(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Block(Bytes::from(value))
    }
}
