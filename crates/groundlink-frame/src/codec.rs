use bytes::{Buf, BytesMut};
use groundlink_codec::{DataType, EncodeError, Endianness, OverflowPolicy, Value};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::{FrameError, Result};

/// How many discarded bytes are echoed into the log.
const LOGGED_JUNK_BYTES: usize = 16;

/// Where the length field sits in a frame and how to turn it into a byte count.
///
/// The frame length is `length * bytes_per_count + length_value_offset`, where
/// `length` is the unsigned field at `length_bit_offset`/`length_bit_size`
/// counted from the first byte of the frame (sync pattern included).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthFraming {
    pub length_bit_offset: u32,
    pub length_bit_size: u32,
    pub length_value_offset: i64,
    pub bytes_per_count: u32,
    pub endianness: Endianness,
    /// Bytes stripped from the front of every extracted frame and zero filled
    /// in front of every outbound one.
    pub discard_leading_bytes: usize,
    /// Marker that starts every frame, as a hex string in configuration.
    #[serde(with = "hex_pattern", skip_serializing_if = "Option::is_none")]
    pub sync_pattern: Option<Vec<u8>>,
    /// Largest accepted length field value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Write the length field (and sync pattern) into outbound frames.
    pub fill_fields: bool,
}

impl Default for LengthFraming {
    fn default() -> Self {
        Self {
            length_bit_offset: 0,
            length_bit_size: 16,
            length_value_offset: 0,
            bytes_per_count: 1,
            endianness: Endianness::Big,
            discard_leading_bytes: 0,
            sync_pattern: None,
            max_length: None,
            fill_fields: true,
        }
    }
}

impl LengthFraming {
    /// Length field layout with every other parameter at its default.
    pub fn new(length_bit_offset: u32, length_bit_size: u32, length_value_offset: i64) -> Self {
        Self {
            length_bit_offset,
            length_bit_size,
            length_value_offset,
            ..Self::default()
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_sync_pattern(mut self, pattern: impl Into<Vec<u8>>) -> Self {
        self.sync_pattern = Some(pattern.into());
        self
    }

    /// Check the parameters once, before any bytes flow.
    pub fn validate(&self) -> Result<()> {
        if self.length_bit_size == 0 || self.length_bit_size > 64 {
            return Err(FrameError::InvalidConfig(format!(
                "length_bit_size must be 1..=64 (got {})",
                self.length_bit_size
            )));
        }
        if self.bytes_per_count == 0 {
            return Err(FrameError::InvalidConfig(
                "bytes_per_count must be at least 1".to_string(),
            ));
        }
        if self.sync_pattern.as_ref().is_some_and(Vec::is_empty) {
            return Err(FrameError::InvalidConfig(
                "sync_pattern must not be empty".to_string(),
            ));
        }
        // Reading against an empty zero-filled buffer rejects every layout the
        // codec cannot address, little-endian bitfields spilling before byte 0
        // included.
        groundlink_codec::read_zero_filled(
            &[],
            self.field_offset()?,
            self.length_bit_size,
            DataType::Uint,
            self.endianness,
        )
        .map_err(|err| FrameError::InvalidConfig(err.to_string()))?;
        Ok(())
    }

    /// Bytes that must be buffered before the length field can be read.
    pub fn length_bytes_needed(&self) -> usize {
        let offset = self.length_bit_offset as usize;
        let size = self.length_bit_size as usize;
        let whole_words = offset % 8 == 0 && matches!(size, 8 | 16 | 32 | 64);
        match self.endianness {
            // Little-endian bitfields end at the byte holding their first bit.
            Endianness::Little if !whole_words => offset / 8 + 1,
            _ => (offset + size).div_ceil(8),
        }
    }

    fn field_offset(&self) -> Result<i32> {
        i32::try_from(self.length_bit_offset).map_err(|_| {
            FrameError::InvalidConfig(format!(
                "length_bit_offset {} is out of range",
                self.length_bit_offset
            ))
        })
    }

    fn sync(&self) -> Option<&[u8]> {
        self.sync_pattern.as_deref().filter(|sync| !sync.is_empty())
    }

    /// Smallest frame that still holds its own header.
    fn minimum_frame(&self) -> usize {
        self.length_bytes_needed()
            .max(self.discard_leading_bytes)
            .max(self.sync().map_or(0, <[u8]>::len))
    }
}

/// Extract the next frame from `src`.
///
/// Returns `Ok(None)` while `src` doesn't hold a complete frame yet. On
/// success the frame is split off the front of `src` (the remainder stays
/// for the next call) and `discard_leading_bytes` are stripped from it.
pub fn decode_frame(src: &mut BytesMut, framing: &LengthFraming) -> Result<Option<BytesMut>> {
    if let Some(sync) = framing.sync() {
        if !align_to_sync(src, sync) {
            return Ok(None);
        }
    }

    let needed = framing.length_bytes_needed();
    if src.len() < needed {
        return Ok(None);
    }

    let value = groundlink_codec::read(
        &src[..needed],
        framing.field_offset()?,
        framing.length_bit_size,
        DataType::Uint,
        framing.endianness,
    )?;
    let Value::Uint(length) = value else {
        return Err(FrameError::InvalidConfig(format!(
            "length field decoded as {}",
            value.kind()
        )));
    };

    if let Some(max) = framing.max_length {
        if length > max {
            return Err(FrameError::LengthTooLarge { length, max });
        }
    }

    let frame_length = i128::from(length) * i128::from(framing.bytes_per_count)
        + i128::from(framing.length_value_offset);
    let minimum = framing.minimum_frame();
    let invalid = || FrameError::InvalidLength {
        length,
        frame_length,
        minimum,
    };
    if frame_length < minimum as i128 {
        return Err(invalid());
    }
    let frame_length = usize::try_from(frame_length).map_err(|_| invalid())?;

    if src.len() < frame_length {
        return Ok(None);
    }

    let mut frame = src.split_to(frame_length);
    frame.advance(framing.discard_leading_bytes);
    trace!(length, frame_length, "extracted frame");
    Ok(Some(frame))
}

/// Frame `payload` and append it to `dst`.
///
/// With `fill_fields` the discarded leading bytes are restored as zeros, the
/// sync pattern is written at the start and the length field is computed from
/// the final frame size. Without it the payload is sent as is.
pub fn encode_frame(payload: &[u8], framing: &LengthFraming, dst: &mut BytesMut) -> Result<()> {
    if !framing.fill_fields {
        dst.extend_from_slice(payload);
        return Ok(());
    }

    let mut frame = BytesMut::with_capacity(framing.discard_leading_bytes + payload.len());
    frame.resize(framing.discard_leading_bytes, 0);
    frame.extend_from_slice(payload);
    if let Some(sync) = framing.sync() {
        if frame.len() < sync.len() {
            frame.resize(sync.len(), 0);
        }
        frame[..sync.len()].copy_from_slice(sync);
    }
    let needed = framing.length_bytes_needed();
    if frame.len() < needed {
        frame.resize(needed, 0);
    }

    // Inverse of the decode side: frame = value * bytes_per_count + value_offset.
    let frame_length = frame.len() as i128;
    let counted = frame_length - i128::from(framing.length_value_offset);
    let per_count = i128::from(framing.bytes_per_count);
    if per_count == 0 {
        return Err(FrameError::InvalidConfig(
            "bytes_per_count must be at least 1".to_string(),
        ));
    }
    let length = u64::try_from(counted / per_count).map_err(|_| EncodeError::Overflow {
        value: (counted / per_count).to_string(),
        bit_size: framing.length_bit_size,
        data_type: DataType::Uint,
    })?;
    if counted % per_count != 0 {
        return Err(FrameError::InvalidLength {
            length,
            frame_length,
            minimum: framing.minimum_frame(),
        });
    }
    if let Some(max) = framing.max_length {
        if length > max {
            return Err(FrameError::LengthTooLarge { length, max });
        }
    }

    groundlink_codec::write(
        &mut frame,
        framing.field_offset()?,
        framing.length_bit_size,
        DataType::Uint,
        framing.endianness,
        &Value::Uint(length),
        OverflowPolicy::Error,
    )?;

    dst.extend_from_slice(&frame);
    Ok(())
}

/// Drop bytes in front of the sync pattern. Returns false when the pattern
/// is not in `src` yet; only a possible partial match is kept then.
fn align_to_sync(src: &mut BytesMut, sync: &[u8]) -> bool {
    match src.windows(sync.len()).position(|window| window == sync) {
        Some(0) => true,
        Some(start) => {
            discard(src, start);
            true
        }
        None => {
            let keep = (sync.len() - 1).min(src.len());
            let junk = src.len() - keep;
            if junk > 0 {
                discard(src, junk);
            }
            false
        }
    }
}

fn discard(src: &mut BytesMut, count: usize) {
    warn!(
        discarded = count,
        leading = %hex::encode_upper(&src[..count.min(LOGGED_JUNK_BYTES)]),
        "discarding bytes before sync pattern"
    );
    src.advance(count);
}

mod hex_pattern {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(pattern: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match pattern {
            Some(bytes) => s.serialize_some(&hex::encode_upper(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let Some(text) = Option::<String>::deserialize(d)? else {
            return Ok(None);
        };
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        hex::decode(digits).map(Some).map_err(D::Error::custom)
    }
}
