use std::fmt;

use groundlink_packet::Thresholds;
use serde::{Deserialize, Serialize};

/// Limits classification of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitsState {
    /// No current data.
    #[default]
    Stale,
    Green,
    GreenHigh,
    GreenLow,
    YellowHigh,
    YellowLow,
    RedHigh,
    RedLow,
}

impl LimitsState {
    pub fn is_red(self) -> bool {
        matches!(self, Self::RedHigh | Self::RedLow)
    }

    pub fn is_yellow(self) -> bool {
        matches!(self, Self::YellowHigh | Self::YellowLow)
    }

    /// Yellow or red.
    pub fn is_out_of_limits(self) -> bool {
        self.is_red() || self.is_yellow()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "STALE",
            Self::Green => "GREEN",
            Self::GreenHigh => "GREEN_HIGH",
            Self::GreenLow => "GREEN_LOW",
            Self::YellowHigh => "YELLOW_HIGH",
            Self::YellowLow => "YELLOW_LOW",
            Self::RedHigh => "RED_HIGH",
            Self::RedLow => "RED_LOW",
        }
    }
}

impl fmt::Display for LimitsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instantaneous classification of `value` by threshold band.
///
/// With a green band, `[green_low, green_high]` is GREEN and the rest of
/// `[yellow_low, yellow_high]` is GREEN_LOW or GREEN_HIGH. Without one, all of
/// `[yellow_low, yellow_high]` is GREEN. Values exactly on a red threshold are
/// yellow.
pub fn classify(value: f64, thresholds: &Thresholds) -> LimitsState {
    let (green_low, green_high) = match (thresholds.green_low, thresholds.green_high) {
        (Some(low), Some(high)) => (low, high),
        _ => (thresholds.yellow_low, thresholds.yellow_high),
    };

    if value < thresholds.red_low {
        LimitsState::RedLow
    } else if value < thresholds.yellow_low {
        LimitsState::YellowLow
    } else if value < green_low {
        LimitsState::GreenLow
    } else if value <= green_high {
        LimitsState::Green
    } else if value <= thresholds.yellow_high {
        LimitsState::GreenHigh
    } else if value <= thresholds.red_high {
        LimitsState::YellowHigh
    } else {
        LimitsState::RedHigh
    }
}

/// Confirmed state of one item plus the classification waiting on persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemLimitsState {
    pub confirmed: LimitsState,
    pub pending: Option<LimitsState>,
    pub pending_count: u32,
}

impl ItemLimitsState {
    /// Record one classification. Returns the previously confirmed state when
    /// this observation confirms a transition.
    ///
    /// RED classifications and the first classification after STALE confirm
    /// immediately. Any other classification must be observed `persistence`
    /// times in a row; a different classification in between starts the count
    /// again at one.
    pub fn observe(&mut self, classification: LimitsState, persistence: u32) -> Option<LimitsState> {
        if classification == self.confirmed {
            self.clear_pending();
            return None;
        }

        if classification.is_red() || self.confirmed == LimitsState::Stale {
            return Some(self.confirm(classification));
        }

        match self.pending {
            Some(pending) if pending == classification => self.pending_count += 1,
            _ => {
                self.pending = Some(classification);
                self.pending_count = 1;
            }
        }

        (self.pending_count >= persistence).then(|| self.confirm(classification))
    }

    /// Return to STALE, dropping any pending classification.
    pub fn set_stale(&mut self) {
        self.confirmed = LimitsState::Stale;
        self.clear_pending();
    }

    fn confirm(&mut self, state: LimitsState) -> LimitsState {
        let previous = self.confirmed;
        self.confirmed = state;
        self.clear_pending();
        previous
    }

    fn clear_pending(&mut self) {
        self.pending = None;
        self.pending_count = 0;
    }
}
