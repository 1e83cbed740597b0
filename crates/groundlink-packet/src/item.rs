use std::sync::Arc;

use groundlink_codec::{DataType, Endianness, OverflowPolicy, Value};

use crate::conversion::Conversion;
use crate::limits::LimitsDefinition;

/// A named value of an item, e.g. `ON = 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemState {
    pub name: String,
    pub value: Value,
}

/// Layout and presentation of one item inside a packet.
///
/// Names are stored upper-case; lookups through [`crate::PacketDefinition`]
/// are case-insensitive.
#[derive(Debug, Clone)]
pub struct ItemDefinition {
    name: String,
    bit_offset: i32,
    bit_size: u32,
    data_type: DataType,
    endianness: Endianness,
    overflow: OverflowPolicy,
    description: Option<String>,
    read_conversion: Option<Arc<dyn Conversion>>,
    write_conversion: Option<Arc<dyn Conversion>>,
    format_string: Option<String>,
    units: Option<String>,
    default_value: Option<Value>,
    id_value: Option<Value>,
    states: Vec<ItemState>,
    limits: Option<LimitsDefinition>,
}

impl ItemDefinition {
    pub fn new(name: impl AsRef<str>, bit_offset: i32, bit_size: u32, data_type: DataType) -> Self {
        Self {
            name: name.as_ref().to_ascii_uppercase(),
            bit_offset,
            bit_size,
            data_type,
            endianness: Endianness::Big,
            overflow: OverflowPolicy::Error,
            description: None,
            read_conversion: None,
            write_conversion: None,
            format_string: None,
            units: None,
            default_value: None,
            id_value: None,
            states: Vec::new(),
            limits: None,
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Conversion applied to raw values when reading CONVERTED and above.
    pub fn with_read_conversion(mut self, conversion: impl Conversion + 'static) -> Self {
        self.read_conversion = Some(Arc::new(conversion));
        self
    }

    /// Conversion applied to engineering values before they are encoded.
    pub fn with_write_conversion(mut self, conversion: impl Conversion + 'static) -> Self {
        self.write_conversion = Some(Arc::new(conversion));
        self
    }

    /// printf-style format used by the FORMATTED representation.
    pub fn with_format_string(mut self, format: impl Into<String>) -> Self {
        self.format_string = Some(format.into());
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Value written when a fresh command buffer is built.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Raw value this item must hold for a buffer to identify as this packet.
    pub fn with_id_value(mut self, value: impl Into<Value>) -> Self {
        self.id_value = Some(value.into());
        self
    }

    pub fn with_state(mut self, name: impl AsRef<str>, value: impl Into<Value>) -> Self {
        self.states.push(ItemState {
            name: name.as_ref().to_ascii_uppercase(),
            value: value.into(),
        });
        self
    }

    pub fn with_limits(mut self, limits: LimitsDefinition) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bit_offset(&self) -> i32 {
        self.bit_offset
    }

    pub fn bit_size(&self) -> u32 {
        self.bit_size
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn read_conversion(&self) -> Option<&Arc<dyn Conversion>> {
        self.read_conversion.as_ref()
    }

    pub fn write_conversion(&self) -> Option<&Arc<dyn Conversion>> {
        self.write_conversion.as_ref()
    }

    pub fn format_string(&self) -> Option<&str> {
        self.format_string.as_deref()
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn id_value(&self) -> Option<&Value> {
        self.id_value.as_ref()
    }

    pub fn states(&self) -> &[ItemState] {
        &self.states
    }

    pub fn limits(&self) -> Option<&LimitsDefinition> {
        self.limits.as_ref()
    }

    /// A zero bit size extends the item to the end of the buffer.
    pub fn is_variable(&self) -> bool {
        self.bit_size == 0
    }

    /// Name of the state whose value equals `value`.
    pub fn state_name(&self, value: &Value) -> Option<&str> {
        self.states
            .iter()
            .find(|state| values_equal(&state.value, value))
            .map(|state| state.name.as_str())
    }

    /// Value of the state called `name` (case-insensitive).
    pub fn state_value(&self, name: &str) -> Option<&Value> {
        self.states
            .iter()
            .find(|state| state.name.eq_ignore_ascii_case(name))
            .map(|state| &state.value)
    }

    /// One past the last byte this item touches when it starts at a
    /// non-negative offset.
    pub(crate) fn end_byte(&self) -> usize {
        let offset = self.bit_offset.max(0) as usize;
        let size = self.bit_size as usize;
        let little_bitfield = self.data_type.is_integer()
            && self.endianness == Endianness::Little
            && !(offset % 8 == 0 && matches!(size, 8 | 16 | 32 | 64));
        if little_bitfield {
            offset / 8 + 1
        } else {
            (offset + size).div_ceil(8)
        }
    }
}

/// Compare values across integer signedness and numeric kinds.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_i128(), right.as_i128()) {
        (Some(l), Some(r)) => l == r,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => match (left.as_bytes(), right.as_bytes()) {
                (Some(l), Some(r)) => l == r,
                _ => false,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_upper_cased() {
        let item = ItemDefinition::new("temp1", 0, 16, DataType::Uint).with_state("on", 1);
        assert_eq!(item.name(), "TEMP1");
        assert_eq!(item.state_value("On"), Some(&Value::Int(1)));
    }

    #[test]
    fn state_lookup_ignores_signedness() {
        let item = ItemDefinition::new("MODE", 0, 8, DataType::Uint)
            .with_state("SAFE", 0)
            .with_state("NOMINAL", 1);
        assert_eq!(item.state_name(&Value::Uint(1)), Some("NOMINAL"));
        assert_eq!(item.state_name(&Value::Uint(7)), None);
    }

    #[test]
    fn end_byte_accounts_for_little_endian_bitfields() {
        let big = ItemDefinition::new("A", 4, 12, DataType::Uint);
        assert_eq!(big.end_byte(), 2);

        let little = ItemDefinition::new("B", 12, 12, DataType::Uint)
            .with_endianness(Endianness::Little);
        assert_eq!(little.end_byte(), 2);

        let word = ItemDefinition::new("C", 16, 32, DataType::Uint)
            .with_endianness(Endianness::Little);
        assert_eq!(word.end_byte(), 6);
    }
}
