use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LimitsConfigError;

/// Name of the limits set every limits definition carries.
pub const DEFAULT_LIMITS_SET: &str = "DEFAULT";

/// Band boundaries of one limits set.
///
/// Values are classified against, in ascending order, `red_low`,
/// `yellow_low`, the optional green band, `yellow_high` and `red_high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub red_low: f64,
    pub yellow_low: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub green_high: Option<f64>,
    pub yellow_high: f64,
    pub red_high: f64,
}

impl Thresholds {
    pub fn new(red_low: f64, yellow_low: f64, yellow_high: f64, red_high: f64) -> Self {
        Self {
            red_low,
            yellow_low,
            green_low: None,
            green_high: None,
            yellow_high,
            red_high,
        }
    }

    /// Add an inner green band.
    pub fn with_green(mut self, green_low: f64, green_high: f64) -> Self {
        self.green_low = Some(green_low);
        self.green_high = Some(green_high);
        self
    }

    /// Check ordering `red_low <= yellow_low <= green_low <= green_high <= yellow_high <= red_high`.
    pub fn validate(&self, set: &str) -> Result<(), LimitsConfigError> {
        let mut bounds = vec![("red_low", self.red_low), ("yellow_low", self.yellow_low)];
        match (self.green_low, self.green_high) {
            (Some(low), Some(high)) => {
                bounds.push(("green_low", low));
                bounds.push(("green_high", high));
            }
            (None, None) => {}
            _ => {
                return Err(LimitsConfigError::PartialGreenBand {
                    set: set.to_string(),
                })
            }
        }
        bounds.push(("yellow_high", self.yellow_high));
        bounds.push(("red_high", self.red_high));

        if let Some(&(name, _)) = bounds.iter().find(|(_, value)| !value.is_finite()) {
            return Err(LimitsConfigError::NonFinite {
                set: set.to_string(),
                name,
            });
        }

        for pair in bounds.windows(2) {
            let (lower_name, lower) = pair[0];
            let (upper_name, upper) = pair[1];
            if lower > upper {
                return Err(LimitsConfigError::Misordered {
                    set: set.to_string(),
                    lower_name,
                    lower,
                    upper_name,
                    upper,
                });
            }
        }
        Ok(())
    }
}

/// Limits attached to a telemetry item.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsDefinition {
    default: Thresholds,
    sets: BTreeMap<String, Thresholds>,
    persistence: u32,
    enabled: bool,
}

impl LimitsDefinition {
    /// Limits with only the DEFAULT set, persistence 1, initially enabled.
    pub fn new(default: Thresholds) -> Self {
        Self {
            default,
            sets: BTreeMap::new(),
            persistence: 1,
            enabled: true,
        }
    }

    /// Add (or replace) a named limits set. Naming `DEFAULT` replaces the default set.
    pub fn with_set(mut self, name: impl AsRef<str>, thresholds: Thresholds) -> Self {
        let name = name.as_ref().to_ascii_uppercase();
        if name == DEFAULT_LIMITS_SET {
            self.default = thresholds;
        } else {
            self.sets.insert(name, thresholds);
        }
        self
    }

    /// Number of consecutive samples required to confirm a non-red transition.
    pub fn with_persistence(mut self, persistence: u32) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn persistence(&self) -> u32 {
        self.persistence
    }

    /// Whether checking starts enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Thresholds of `set`, falling back to DEFAULT when the item does not define it.
    pub fn thresholds(&self, set: &str) -> &Thresholds {
        self.sets.get(set).unwrap_or(&self.default)
    }

    /// Names of all sets, DEFAULT first.
    pub fn set_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(DEFAULT_LIMITS_SET).chain(self.sets.keys().map(String::as_str))
    }

    pub fn validate(&self) -> Result<(), LimitsConfigError> {
        if self.persistence == 0 {
            return Err(LimitsConfigError::ZeroPersistence);
        }
        self.default.validate(DEFAULT_LIMITS_SET)?;
        for (name, thresholds) in &self.sets {
            thresholds.validate(name)?;
        }
        Ok(())
    }
}
