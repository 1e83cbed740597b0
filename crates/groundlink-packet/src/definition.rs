use std::collections::HashMap;
use std::fmt;

use bytes::BytesMut;
use groundlink_codec::{read, write};
use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, PacketError};
use crate::item::{values_equal, ItemDefinition};

/// Target and packet name pair that identifies a packet type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PacketIdentity {
    pub target: String,
    pub packet: String,
}

impl PacketIdentity {
    /// Names are upper-cased.
    pub fn new(target: impl AsRef<str>, packet: impl AsRef<str>) -> Self {
        Self {
            target: target.as_ref().to_ascii_uppercase(),
            packet: packet.as_ref().to_ascii_uppercase(),
        }
    }

    /// Identity given to buffers that match no definition.
    pub fn unknown() -> Self {
        Self::new("UNKNOWN", "UNKNOWN")
    }
}

impl fmt::Display for PacketIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.target, self.packet)
    }
}

/// Buffer length implied by a definition's items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLength {
    /// Every item has a fixed size.
    Fixed(usize),
    /// One item runs to the end of the buffer; `minimum` covers the fixed items.
    Variable { minimum: usize },
}

impl PacketLength {
    /// Smallest buffer that holds every fixed-size item.
    pub fn minimum(self) -> usize {
        match self {
            Self::Fixed(len) | Self::Variable { minimum: len } => len,
        }
    }
}

/// Immutable layout of a packet type.
#[derive(Debug)]
pub struct PacketDefinition {
    identity: PacketIdentity,
    description: Option<String>,
    items: Vec<ItemDefinition>,
    index: HashMap<String, usize>,
    id_items: Vec<usize>,
    length: PacketLength,
}

impl PacketDefinition {
    /// Validate `items` and build the definition.
    ///
    /// Rejects duplicate names, invalid item layouts, more than one
    /// variable-size item, a variable-size item that is not positioned last,
    /// inconsistent limits, and id or default values that do not fit their item.
    pub fn define(
        target: &str,
        packet: &str,
        items: Vec<ItemDefinition>,
    ) -> Result<Self, DefinitionError> {
        if target.trim().is_empty() || packet.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }
        let identity = PacketIdentity::new(target.trim(), packet.trim());
        let packet_name = identity.to_string();

        let mut index = HashMap::with_capacity(items.len());
        let mut variable: Option<usize> = None;
        let mut scratch = BytesMut::new();

        for (position, item) in items.iter().enumerate() {
            groundlink_codec::validate(item.bit_offset(), item.bit_size(), item.data_type())
                .map_err(|source| DefinitionError::InvalidItem {
                    packet: packet_name.clone(),
                    name: item.name().to_string(),
                    source,
                })?;

            if index.insert(item.name().to_string(), position).is_some() {
                return Err(DefinitionError::DuplicateItem {
                    packet: packet_name,
                    name: item.name().to_string(),
                });
            }

            if item.is_variable() {
                if let Some(first) = variable {
                    return Err(DefinitionError::MultipleVariableItems {
                        packet: packet_name,
                        first: items[first].name().to_string(),
                        second: item.name().to_string(),
                    });
                }
                variable = Some(position);
            }

            if let Some(limits) = item.limits() {
                if item.data_type().is_bytes() {
                    return Err(DefinitionError::LimitsOnNonNumeric {
                        packet: packet_name,
                        name: item.name().to_string(),
                    });
                }
                limits
                    .validate()
                    .map_err(|source| DefinitionError::InvalidLimits {
                        packet: packet_name.clone(),
                        name: item.name().to_string(),
                        source,
                    })?;
            }

            for value in [item.id_value(), item.default_value()].into_iter().flatten() {
                scratch.clear();
                // Negative offsets need a buffer long enough to resolve against.
                scratch.resize((-i64::from(item.bit_offset().min(0)) as usize).div_ceil(8), 0);
                write(
                    &mut scratch,
                    item.bit_offset(),
                    item.bit_size(),
                    item.data_type(),
                    item.endianness(),
                    value,
                    item.overflow(),
                )
                .map_err(|source| DefinitionError::InvalidValue {
                    packet: packet_name.clone(),
                    name: item.name().to_string(),
                    source,
                })?;
            }
        }

        if let Some(position) = variable {
            let start = items[position].bit_offset();
            if let Some(following) = items
                .iter()
                .enumerate()
                .find(|(other, item)| *other != position && item.bit_offset() >= start)
            {
                return Err(DefinitionError::VariableItemNotLast {
                    packet: packet_name,
                    name: items[position].name().to_string(),
                    following: following.1.name().to_string(),
                });
            }
        }

        let leading = items
            .iter()
            .filter(|item| item.bit_offset() >= 0)
            .map(ItemDefinition::end_byte)
            .max()
            .unwrap_or(0);
        let trailing = items
            .iter()
            .filter(|item| item.bit_offset() < 0)
            .map(|item| (-i64::from(item.bit_offset()) as usize).div_ceil(8))
            .max()
            .unwrap_or(0);
        let minimum = leading + trailing;
        let length = if variable.is_some() {
            PacketLength::Variable { minimum }
        } else {
            PacketLength::Fixed(minimum)
        };

        let id_items = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.id_value().is_some())
            .map(|(position, _)| position)
            .collect();

        Ok(Self {
            identity,
            description: None,
            items,
            index,
            id_items,
            length,
        })
    }

    /// Definition with no items, bound to buffers that match nothing else.
    pub fn unknown() -> Self {
        Self {
            identity: PacketIdentity::unknown(),
            description: None,
            items: Vec::new(),
            index: HashMap::new(),
            id_items: Vec::new(),
            length: PacketLength::Variable { minimum: 0 },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn identity(&self) -> &PacketIdentity {
        &self.identity
    }

    pub fn target_name(&self) -> &str {
        &self.identity.target
    }

    pub fn packet_name(&self) -> &str {
        &self.identity.packet
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Items in definition order.
    pub fn items(&self) -> &[ItemDefinition] {
        &self.items
    }

    /// Case-insensitive item lookup.
    pub fn item(&self, name: &str) -> Option<&ItemDefinition> {
        let position = match self.index.get(name) {
            Some(position) => *position,
            None => *self.index.get(&name.to_ascii_uppercase())?,
        };
        self.items.get(position)
    }

    pub fn length(&self) -> PacketLength {
        self.length
    }

    pub fn has_id_items(&self) -> bool {
        !self.id_items.is_empty()
    }

    /// Items with limits attached.
    pub fn limits_items(&self) -> impl Iterator<Item = &ItemDefinition> {
        self.items.iter().filter(|item| item.limits().is_some())
    }

    /// Whether every id item of this definition holds its id value in `buffer`.
    ///
    /// A definition without id items matches any buffer.
    pub fn identify(&self, buffer: &[u8]) -> bool {
        self.id_items.iter().all(|&position| {
            let item = &self.items[position];
            let Some(expected) = item.id_value() else {
                return false;
            };
            match read(
                buffer,
                item.bit_offset(),
                item.bit_size(),
                item.data_type(),
                item.endianness(),
            ) {
                Ok(actual) => values_equal(expected, &actual),
                Err(_) => false,
            }
        })
    }

    /// Zeroed buffer of the minimum length with default and id values written.
    pub fn default_buffer(&self) -> Result<BytesMut, PacketError> {
        let mut buffer = BytesMut::zeroed(self.length.minimum());
        for item in &self.items {
            let Some(value) = item.default_value().or(item.id_value()) else {
                continue;
            };
            write(
                &mut buffer,
                item.bit_offset(),
                item.bit_size(),
                item.data_type(),
                item.endianness(),
                value,
                item.overflow(),
            )
            .map_err(|source| PacketError::Encode {
                item: item.name().to_string(),
                source,
            })?;
        }
        Ok(buffer)
    }
}
