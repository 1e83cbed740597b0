//! JSON station files: command and telemetry definitions plus interfaces.
//!
//! ```json
//! {
//!   "telemetry": [{
//!     "target": "INST", "packet": "HEALTH",
//!     "items": [
//!       {"name": "PKTID", "bit_offset": 0, "bit_size": 8, "data_type": "UINT", "id_value": 1},
//!       {"name": "TEMP", "bit_offset": 8, "bit_size": 16, "data_type": "UINT",
//!        "read_conversion": {"type": "polynomial", "coefficients": [-40.0, 0.1]},
//!        "limits": {"persistence": 2, "sets": {"DEFAULT": {
//!          "red_low": -20.0, "yellow_low": -10.0, "yellow_high": 40.0, "red_high": 50.0}}}}
//!     ]
//!   }],
//!   "interfaces": [{"name": "INST_INT", "transport": {"type": "tcp", "address": "127.0.0.1:7779"}}]
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use groundlink_interface::{Interface, InterfaceConfig};
use groundlink_packet::{
    DataType, DefinitionTable, Endianness, ItemDefinition, LimitsDefinition, OverflowPolicy,
    PacketDefinition, PolynomialConversion, Segment, SegmentedPolynomialConversion, Thresholds,
    Value, DEFAULT_LIMITS_SET,
};
use serde::{Deserialize, Serialize};

use crate::api::item_value_from_json;
use crate::error::{GroundError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default)]
    pub commands: Vec<PacketConfig>,
    #[serde(default)]
    pub telemetry: Vec<PacketConfig>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketConfig {
    pub target: String,
    pub packet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub items: Vec<ItemConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub name: String,
    pub bit_offset: i32,
    pub bit_size: u32,
    pub data_type: DataType,
    #[serde(default)]
    pub endianness: Endianness,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// State name to value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub states: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_conversion: Option<ConversionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_conversion: Option<ConversionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConversionConfig {
    Polynomial { coefficients: Vec<f64> },
    Segmented { segments: Vec<SegmentConfig> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub lower_bound: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_persistence")]
    pub persistence: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Limits set name to thresholds. Must include DEFAULT.
    pub sets: BTreeMap<String, Thresholds>,
}

fn default_persistence() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

/// Definitions and interfaces built from a [`StationConfig`].
#[derive(Debug, Clone)]
pub struct Station {
    pub commands: Arc<DefinitionTable>,
    pub telemetry: Arc<DefinitionTable>,
    pub interfaces: Vec<InterfaceConfig>,
}

impl StationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| GroundError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Validate everything and build the definition tables.
    pub fn build(self) -> Result<Station> {
        let mut names = HashSet::new();
        for interface in &self.interfaces {
            interface.framing.validate()?;
            if !names.insert(interface.name.to_ascii_uppercase()) {
                return Err(GroundError::DuplicateInterface(interface.name.clone()));
            }
        }

        Ok(Station {
            commands: Arc::new(table(&self.commands)?),
            telemetry: Arc::new(table(&self.telemetry)?),
            interfaces: self.interfaces,
        })
    }
}

impl Station {
    pub fn interface_config(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces
            .iter()
            .find(|interface| interface.name.eq_ignore_ascii_case(name))
    }

    /// Unconnected interface for the named entry.
    pub fn interface(&self, name: &str) -> Result<Option<Interface>> {
        let Some(config) = self.interface_config(name) else {
            return Ok(None);
        };
        let interface = Interface::new(
            config.clone(),
            Arc::clone(&self.telemetry),
            Arc::clone(&self.commands),
        )?;
        Ok(Some(interface))
    }
}

fn table(packets: &[PacketConfig]) -> Result<DefinitionTable> {
    let mut table = DefinitionTable::new();
    for packet in packets {
        table.insert(packet.definition()?);
    }
    Ok(table)
}

impl PacketConfig {
    pub fn definition(&self) -> Result<PacketDefinition> {
        let items = self
            .items
            .iter()
            .map(|item| item.definition(&self.target, &self.packet))
            .collect::<Result<Vec<_>>>()?;
        let definition = PacketDefinition::define(&self.target, &self.packet, items)?;
        Ok(match &self.description {
            Some(description) => definition.with_description(description.clone()),
            None => definition,
        })
    }
}

impl ItemConfig {
    fn definition(&self, target: &str, packet: &str) -> Result<ItemDefinition> {
        let value = |json: &serde_json::Value| -> Result<Value> {
            item_value_from_json(json, self.data_type).ok_or_else(|| GroundError::InvalidValue {
                packet: format!("{target} {packet}"),
                item: self.name.clone(),
                reason: format!("unsupported value {json}"),
            })
        };

        let mut item = ItemDefinition::new(&self.name, self.bit_offset, self.bit_size, self.data_type)
            .with_endianness(self.endianness)
            .with_overflow(self.overflow);
        if let Some(description) = &self.description {
            item = item.with_description(description.clone());
        }
        if let Some(id_value) = &self.id_value {
            item = item.with_id_value(value(id_value)?);
        }
        if let Some(default) = &self.default {
            item = item.with_default(value(default)?);
        }
        for (name, state) in &self.states {
            item = item.with_state(name, value(state)?);
        }
        if let Some(format) = &self.format_string {
            item = item.with_format_string(format.clone());
        }
        if let Some(units) = &self.units {
            item = item.with_units(units.clone());
        }
        item = match &self.read_conversion {
            Some(ConversionConfig::Polynomial { coefficients }) => {
                item.with_read_conversion(PolynomialConversion::new(coefficients.clone()))
            }
            Some(ConversionConfig::Segmented { segments }) => {
                item.with_read_conversion(segmented(segments))
            }
            None => item,
        };
        item = match &self.write_conversion {
            Some(ConversionConfig::Polynomial { coefficients }) => {
                item.with_write_conversion(PolynomialConversion::new(coefficients.clone()))
            }
            Some(ConversionConfig::Segmented { segments }) => {
                item.with_write_conversion(segmented(segments))
            }
            None => item,
        };
        if let Some(limits) = &self.limits {
            item = item.with_limits(limits.definition(target, packet, &self.name)?);
        }
        Ok(item)
    }
}

fn segmented(segments: &[SegmentConfig]) -> SegmentedPolynomialConversion {
    SegmentedPolynomialConversion::new(
        segments
            .iter()
            .map(|segment| Segment {
                lower_bound: segment.lower_bound,
                coefficients: segment.coefficients.clone(),
            })
            .collect(),
    )
}

impl LimitsConfig {
    fn definition(&self, target: &str, packet: &str, item: &str) -> Result<LimitsDefinition> {
        let default = self
            .sets
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(DEFAULT_LIMITS_SET))
            .map(|(_, thresholds)| *thresholds)
            .ok_or_else(|| GroundError::MissingDefaultSet {
                packet: format!("{target} {packet}"),
                item: item.to_string(),
            })?;

        let mut limits = LimitsDefinition::new(default)
            .with_persistence(self.persistence)
            .with_enabled(self.enabled);
        for (name, thresholds) in &self.sets {
            if !name.eq_ignore_ascii_case(DEFAULT_LIMITS_SET) {
                limits = limits.with_set(name, *thresholds);
            }
        }
        Ok(limits)
    }
}
