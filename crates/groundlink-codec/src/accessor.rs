use bytes::{Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError, FieldError};
use crate::types::{DataType, Endianness, OverflowPolicy, Value};

/// Byte range touched by a field once its offset is resolved against a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    lower: usize,
    /// Exclusive.
    upper: usize,
    /// Bit position of the field's most significant bit inside the (possibly
    /// reversed) span.
    start_bit: usize,
    /// Little-endian spans are reversed before bits are extracted.
    reversed: bool,
}

/// Read a field from `buffer`.
///
/// Fails with [`DecodeError::OutOfBounds`] when the field extends past the end
/// of the buffer; see [`read_zero_filled`] for the lenient variant.
pub fn read(
    buffer: &[u8],
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
) -> Result<Value, DecodeError> {
    read_field(buffer, bit_offset, bit_size, data_type, endianness, false)
}

/// Read a field, treating bytes past the end of `buffer` as zero.
pub fn read_zero_filled(
    buffer: &[u8],
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
) -> Result<Value, DecodeError> {
    read_field(buffer, bit_offset, bit_size, data_type, endianness, true)
}

/// Write `value` into a field of `buffer`.
///
/// The buffer grows (zero filled) when the field lies past its end. A
/// zero-size string or block replaces everything from the offset onward.
pub fn write(
    buffer: &mut BytesMut,
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
    value: &Value,
    overflow: OverflowPolicy,
) -> Result<(), EncodeError> {
    validate(bit_offset, bit_size, data_type)?;
    let offset = resolve_offset(bit_offset, bit_size, buffer.len())?;

    match data_type {
        DataType::Int | DataType::Uint => {
            let bits = integer_bits(value, bit_size, data_type, overflow)?;
            let span = span(offset, bit_offset, bit_size, data_type, endianness, buffer.len())?;
            grow(buffer, span.upper);
            insert_bits(&mut buffer[span.lower..span.upper], span, bit_size, bits);
        }
        DataType::Float => {
            let encoded = float_bytes(value, bit_size, endianness, overflow)?;
            let lower = offset / 8;
            grow(buffer, lower + encoded.len());
            buffer[lower..lower + encoded.len()].copy_from_slice(&encoded);
        }
        DataType::String | DataType::Block => {
            let data = value.as_bytes().ok_or(EncodeError::TypeMismatch {
                expected: data_type,
                found: value.kind(),
            })?;
            write_bytes(buffer, offset / 8, bit_size, data, overflow)?;
        }
    }
    Ok(())
}

fn read_field(
    buffer: &[u8],
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
    zero_fill: bool,
) -> Result<Value, DecodeError> {
    validate(bit_offset, bit_size, data_type)?;
    let offset = resolve_offset(bit_offset, bit_size, buffer.len())?;
    let span = span(offset, bit_offset, bit_size, data_type, endianness, buffer.len())?;

    if span.upper > buffer.len() {
        if !zero_fill {
            return Err(DecodeError::OutOfBounds {
                bit_offset,
                bit_size,
                buffer_len: buffer.len(),
            });
        }
        let mut padded = buffer.to_vec();
        padded.resize(span.upper, 0);
        return Ok(decode(&padded[span.lower..span.upper], span, bit_size, data_type, endianness));
    }

    Ok(decode(&buffer[span.lower..span.upper], span, bit_size, data_type, endianness))
}

fn decode(
    bytes: &[u8],
    span: Span,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
) -> Value {
    match data_type {
        DataType::Uint => Value::Uint(extract_bits(bytes, span, bit_size)),
        DataType::Int => {
            let raw = extract_bits(bytes, span, bit_size);
            Value::Int(sign_extend(raw, bit_size))
        }
        DataType::Float => Value::Float(decode_float(bytes, endianness)),
        DataType::String => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Value::String(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        DataType::Block => Value::Block(Bytes::copy_from_slice(bytes)),
    }
}

/// Check that a field layout is valid for its data type, independent of any buffer.
pub fn validate(bit_offset: i32, bit_size: u32, data_type: DataType) -> Result<(), FieldError> {
    let invalid_size = FieldError::InvalidBitSize {
        bit_size,
        data_type,
    };
    match data_type {
        DataType::Int | DataType::Uint => {
            if bit_size == 0 || bit_size > 64 {
                return Err(invalid_size);
            }
        }
        DataType::Float => {
            if bit_size != 32 && bit_size != 64 {
                return Err(invalid_size);
            }
        }
        DataType::String | DataType::Block => {
            if bit_size % 8 != 0 {
                return Err(invalid_size);
            }
            if bit_size == 0 && bit_offset < 0 {
                return Err(FieldError::VariableSizeNegativeOffset { bit_offset });
            }
        }
    }
    if !data_type.is_integer() && bit_offset % 8 != 0 {
        return Err(FieldError::Unaligned {
            bit_offset,
            data_type,
        });
    }
    Ok(())
}

fn resolve_offset(bit_offset: i32, bit_size: u32, buffer_len: usize) -> Result<usize, FieldError> {
    if bit_offset >= 0 {
        return Ok(bit_offset as usize);
    }
    let from_end = buffer_len as i64 * 8 + i64::from(bit_offset);
    if from_end < 0 {
        return Err(FieldError::BeforeStart {
            bit_offset,
            bit_size,
            buffer_len,
        });
    }
    Ok(from_end as usize)
}

fn span(
    offset: usize,
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
    buffer_len: usize,
) -> Result<Span, FieldError> {
    let size = bit_size as usize;
    let lower = offset / 8;
    let start_bit = offset % 8;

    if !data_type.is_integer() {
        let upper = if size == 0 {
            lower.max(buffer_len)
        } else {
            lower + size / 8
        };
        return Ok(Span {
            lower,
            upper,
            start_bit: 0,
            reversed: false,
        });
    }

    match endianness {
        Endianness::Big => Ok(Span {
            lower,
            upper: (offset + size - 1) / 8 + 1,
            start_bit,
            reversed: false,
        }),
        Endianness::Little if start_bit == 0 && matches!(size, 8 | 16 | 32 | 64) => Ok(Span {
            lower,
            upper: lower + size / 8,
            start_bit: 0,
            reversed: true,
        }),
        Endianness::Little => {
            // Little-endian bitfields: the offset names the most significant bit
            // and the field spills toward lower addresses.
            let num_bytes = (start_bit + size - 1) / 8 + 1;
            let upper = lower + 1;
            if upper < num_bytes {
                return Err(FieldError::BeforeStart {
                    bit_offset,
                    bit_size,
                    buffer_len,
                });
            }
            Ok(Span {
                lower: upper - num_bytes,
                upper,
                start_bit,
                reversed: true,
            })
        }
    }
}

fn gather(bytes: &[u8], reversed: bool) -> u128 {
    let fold = |acc: u128, byte: &u8| (acc << 8) | u128::from(*byte);
    if reversed {
        bytes.iter().rev().fold(0, fold)
    } else {
        bytes.iter().fold(0, fold)
    }
}

fn scatter(bytes: &mut [u8], reversed: bool, mut acc: u128) {
    let mut store = |byte: &mut u8| {
        *byte = (acc & 0xFF) as u8;
        acc >>= 8;
    };
    if reversed {
        bytes.iter_mut().for_each(&mut store);
    } else {
        bytes.iter_mut().rev().for_each(&mut store);
    }
}

fn field_shift(span: Span, len: usize, bit_size: u32) -> u32 {
    (len * 8 - span.start_bit - bit_size as usize) as u32
}

fn field_mask(bit_size: u32) -> u128 {
    (1u128 << bit_size) - 1
}

fn extract_bits(bytes: &[u8], span: Span, bit_size: u32) -> u64 {
    let acc = gather(bytes, span.reversed);
    ((acc >> field_shift(span, bytes.len(), bit_size)) & field_mask(bit_size)) as u64
}

fn insert_bits(bytes: &mut [u8], span: Span, bit_size: u32, bits: u64) {
    let shift = field_shift(span, bytes.len(), bit_size);
    let mask = field_mask(bit_size) << shift;
    let acc = gather(bytes, span.reversed);
    let acc = (acc & !mask) | ((u128::from(bits) << shift) & mask);
    scatter(bytes, span.reversed, acc);
}

fn sign_extend(raw: u64, bit_size: u32) -> i64 {
    let unused = 64 - bit_size;
    ((raw << unused) as i64) >> unused
}

fn decode_float(bytes: &[u8], endianness: Endianness) -> f64 {
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    match (bytes.len(), endianness) {
        (4, Endianness::Big) => f64::from(f32::from_be_bytes([word[0], word[1], word[2], word[3]])),
        (4, Endianness::Little) => {
            f64::from(f32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        }
        (_, Endianness::Big) => f64::from_be_bytes(word),
        (_, Endianness::Little) => f64::from_le_bytes(word),
    }
}

/// Integer range of a field as `(min, max, max_with_hex)`.
fn integer_bounds(bit_size: u32, data_type: DataType) -> (i128, i128, i128) {
    let unsigned_max = (1i128 << bit_size) - 1;
    match data_type {
        DataType::Int => (
            -(1i128 << (bit_size - 1)),
            (1i128 << (bit_size - 1)) - 1,
            unsigned_max,
        ),
        _ => (0, unsigned_max, unsigned_max),
    }
}

fn integer_bits(
    value: &Value,
    bit_size: u32,
    data_type: DataType,
    overflow: OverflowPolicy,
) -> Result<u64, EncodeError> {
    let overflow_error = |value: String| EncodeError::Overflow {
        value,
        bit_size,
        data_type,
    };

    let wide: i128 = match value {
        Value::Int(v) => i128::from(*v),
        Value::Uint(v) => i128::from(*v),
        Value::Float(v) if v.is_finite() => v.trunc() as i128,
        Value::Float(v) => return Err(overflow_error(v.to_string())),
        Value::String(text) => parse_integer(text)?,
        Value::Block(_) => {
            return Err(EncodeError::TypeMismatch {
                expected: data_type,
                found: value.kind(),
            })
        }
    };

    let (min, max, hex_max) = integer_bounds(bit_size, data_type);
    let wide = if wide < min || wide > max {
        match overflow {
            OverflowPolicy::Error => return Err(overflow_error(wide.to_string())),
            OverflowPolicy::ErrorAllowHex if wide < min || wide > hex_max => {
                return Err(overflow_error(wide.to_string()))
            }
            OverflowPolicy::ErrorAllowHex | OverflowPolicy::Truncate => wide,
            OverflowPolicy::Saturate => wide.clamp(min, max),
        }
    } else {
        wide
    };

    Ok(((wide as u128) & field_mask(bit_size)) as u64)
}

fn parse_integer(text: &str) -> Result<i128, EncodeError> {
    let invalid = || EncodeError::InvalidNumber {
        text: text.to_string(),
    };
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => digits.parse::<i128>().map_err(|_| invalid())?,
    };
    Ok(if negative { -magnitude } else { magnitude })
}

fn float_bytes(
    value: &Value,
    bit_size: u32,
    endianness: Endianness,
    overflow: OverflowPolicy,
) -> Result<Vec<u8>, EncodeError> {
    let number = match value {
        Value::String(text) => text.trim().parse::<f64>().map_err(|_| EncodeError::InvalidNumber {
            text: text.clone(),
        })?,
        other => other.as_f64().ok_or(EncodeError::TypeMismatch {
            expected: DataType::Float,
            found: other.kind(),
        })?,
    };

    if bit_size == 64 {
        return Ok(match endianness {
            Endianness::Big => number.to_be_bytes().to_vec(),
            Endianness::Little => number.to_le_bytes().to_vec(),
        });
    }

    let fits = !number.is_finite() || number.abs() <= f64::from(f32::MAX);
    let single = match overflow {
        OverflowPolicy::Error | OverflowPolicy::ErrorAllowHex if !fits => {
            return Err(EncodeError::Overflow {
                value: number.to_string(),
                bit_size,
                data_type: DataType::Float,
            })
        }
        OverflowPolicy::Saturate if !fits => number.clamp(f64::from(f32::MIN), f64::from(f32::MAX)) as f32,
        _ => number as f32,
    };
    Ok(match endianness {
        Endianness::Big => single.to_be_bytes().to_vec(),
        Endianness::Little => single.to_le_bytes().to_vec(),
    })
}

fn write_bytes(
    buffer: &mut BytesMut,
    lower: usize,
    bit_size: u32,
    data: &[u8],
    overflow: OverflowPolicy,
) -> Result<(), EncodeError> {
    if bit_size == 0 {
        grow(buffer, lower);
        buffer.truncate(lower);
        buffer.extend_from_slice(data);
        return Ok(());
    }

    let size = bit_size as usize / 8;
    let data = if data.len() > size {
        if overflow != OverflowPolicy::Truncate {
            return Err(EncodeError::ValueTooLong {
                len: data.len(),
                size,
            });
        }
        &data[..size]
    } else {
        data
    };

    grow(buffer, lower + size);
    buffer[lower..lower + data.len()].copy_from_slice(data);
    buffer[lower + data.len()..lower + size].fill(0);
    Ok(())
}

fn grow(buffer: &mut BytesMut, len: usize) {
    if buffer.len() < len {
        buffer.resize(len, 0);
    }
}
