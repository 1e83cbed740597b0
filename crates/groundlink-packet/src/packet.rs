use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::BytesMut;
use groundlink_codec::{read, write, Value};
use serde::{Deserialize, Serialize};

use crate::definition::{PacketDefinition, PacketIdentity};
use crate::error::{PacketError, Result};
use crate::format::format_value;
use crate::item::ItemDefinition;

/// Representation an item is read or written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    /// Value exactly as decoded from the buffer.
    Raw,
    /// Raw value through the read conversion, mapped to a state name when one matches.
    #[default]
    Converted,
    /// Converted value rendered through the item's format string.
    Formatted,
    /// Formatted value followed by the item's units.
    WithUnits,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Raw => "RAW",
            Self::Converted => "CONVERTED",
            Self::Formatted => "FORMATTED",
            Self::WithUnits => "WITH_UNITS",
        })
    }
}

/// A buffer bound to a packet definition.
///
/// Cloning yields an independent buffer. Converted values are cached until the
/// buffer changes.
#[derive(Debug, Clone)]
pub struct Packet {
    definition: Arc<PacketDefinition>,
    buffer: BytesMut,
    cache: HashMap<String, Value>,
    received_time: Option<SystemTime>,
    received_count: u64,
}

impl Packet {
    pub fn bind(definition: Arc<PacketDefinition>, buffer: BytesMut) -> Self {
        Self {
            definition,
            buffer,
            cache: HashMap::new(),
            received_time: None,
            received_count: 0,
        }
    }

    /// Fresh command packet holding the definition's default and id values.
    pub fn command(definition: Arc<PacketDefinition>) -> Result<Self> {
        let buffer = definition.default_buffer()?;
        Ok(Self::bind(definition, buffer))
    }

    pub fn definition(&self) -> &Arc<PacketDefinition> {
        &self.definition
    }

    pub fn identity(&self) -> &PacketIdentity {
        self.definition.identity()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_buffer(self) -> BytesMut {
        self.buffer
    }

    /// Replace the buffer and drop every cached value.
    pub fn set_buffer(&mut self, buffer: BytesMut) {
        self.buffer = buffer;
        self.cache.clear();
    }

    pub fn received_time(&self) -> Option<SystemTime> {
        self.received_time
    }

    pub fn set_received_time(&mut self, time: SystemTime) {
        self.received_time = Some(time);
    }

    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    pub fn set_received_count(&mut self, count: u64) {
        self.received_count = count;
    }

    /// Decode an item without conversion and without touching the cache.
    pub fn read_raw(&self, name: &str) -> Result<Value> {
        let item = self.item(name)?;
        self.decode(item)
    }

    /// Read an item in the requested representation.
    pub fn read(&mut self, name: &str, value_type: ValueType) -> Result<Value> {
        let definition = Arc::clone(&self.definition);
        let item = item_of(&definition, name)?;

        let raw = self.decode(item)?;
        if value_type == ValueType::Raw {
            return Ok(raw);
        }

        let converted = self.convert(item, raw)?;
        let state = item.state_name(&converted).map(str::to_string);
        if value_type == ValueType::Converted {
            return Ok(state.map(Value::String).unwrap_or(converted));
        }

        let mut text = match (state, item.format_string()) {
            (Some(state), _) => state,
            (None, Some(format)) => {
                format_value(format, &converted).map_err(|source| PacketError::Format {
                    item: item.name().to_string(),
                    source,
                })?
            }
            (None, None) => converted.to_string(),
        };
        if value_type == ValueType::WithUnits {
            if let Some(units) = item.units() {
                text.push(' ');
                text.push_str(units);
            }
        }
        Ok(Value::String(text))
    }

    /// Write an item from the given representation.
    ///
    /// RAW values are encoded directly. CONVERTED values are mapped from state
    /// names and through the write conversion first. FORMATTED and WITH_UNITS
    /// are display-only and rejected.
    pub fn write(&mut self, name: &str, value: &Value, value_type: ValueType) -> Result<()> {
        let definition = Arc::clone(&self.definition);
        let item = item_of(&definition, name)?;

        let encoded = match value_type {
            ValueType::Raw => value.clone(),
            ValueType::Converted => {
                let value = self.state_to_value(item, value)?;
                match item.write_conversion() {
                    Some(conversion) => conversion.convert(&value, self).map_err(|source| {
                        PacketError::Conversion {
                            item: item.name().to_string(),
                            source,
                        }
                    })?,
                    None => value,
                }
            }
            ValueType::Formatted | ValueType::WithUnits => {
                return Err(PacketError::UnsupportedWrite {
                    item: item.name().to_string(),
                    value_type,
                })
            }
        };

        write(
            &mut self.buffer,
            item.bit_offset(),
            item.bit_size(),
            item.data_type(),
            item.endianness(),
            &encoded,
            item.overflow(),
        )
        .map_err(|source| PacketError::Encode {
            item: item.name().to_string(),
            source,
        })?;
        // Conversions may depend on sibling items, so nothing cached survives a write.
        self.cache.clear();
        Ok(())
    }

    /// Read every item. Failures are reported per item.
    pub fn read_all(&mut self, value_type: ValueType) -> Vec<(String, Result<Value>)> {
        let definition = Arc::clone(&self.definition);
        definition
            .items()
            .iter()
            .map(|item| (item.name().to_string(), self.read(item.name(), value_type)))
            .collect()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn item(&self, name: &str) -> Result<&ItemDefinition> {
        item_of(&self.definition, name)
    }

    fn decode(&self, item: &ItemDefinition) -> Result<Value> {
        read(
            &self.buffer,
            item.bit_offset(),
            item.bit_size(),
            item.data_type(),
            item.endianness(),
        )
        .map_err(|source| PacketError::Decode {
            item: item.name().to_string(),
            source,
        })
    }

    fn convert(&mut self, item: &ItemDefinition, raw: Value) -> Result<Value> {
        let Some(conversion) = item.read_conversion() else {
            return Ok(raw);
        };
        if let Some(cached) = self.cache.get(item.name()) {
            return Ok(cached.clone());
        }
        let converted =
            conversion
                .convert(&raw, self)
                .map_err(|source| PacketError::Conversion {
                    item: item.name().to_string(),
                    source,
                })?;
        self.cache
            .insert(item.name().to_string(), converted.clone());
        Ok(converted)
    }

    fn state_to_value(&self, item: &ItemDefinition, value: &Value) -> Result<Value> {
        let Value::String(text) = value else {
            return Ok(value.clone());
        };
        if item.states().is_empty() || item.data_type().is_bytes() {
            return Ok(value.clone());
        }
        item.state_value(text)
            .cloned()
            .ok_or_else(|| PacketError::UnknownState {
                item: item.name().to_string(),
                state: text.clone(),
            })
    }
}

fn item_of<'a>(definition: &'a PacketDefinition, name: &str) -> Result<&'a ItemDefinition> {
    definition
        .item(name)
        .ok_or_else(|| PacketError::UnknownItem {
            packet: definition.identity().to_string(),
            item: name.to_ascii_uppercase(),
        })
}
