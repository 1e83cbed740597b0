use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use groundlink_packet::PacketIdentity;
use serde::{Deserialize, Serialize};

/// Identifies one telemetry item: target, packet and item name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    #[serde(flatten)]
    pub packet: PacketIdentity,
    pub item: String,
}

impl ItemKey {
    /// Names are upper-cased.
    pub fn new(target: &str, packet: &str, item: &str) -> Self {
        Self {
            packet: PacketIdentity::new(target, packet),
            item: item.to_ascii_uppercase(),
        }
    }

    pub fn of(packet: &PacketIdentity, item: &str) -> Self {
        Self {
            packet: packet.clone(),
            item: item.to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.packet, self.item)
    }
}

/// Shared enable/disable switches for limits evaluation.
///
/// Clones share the same switches, so a group evaluator on a background task
/// and the engine on a delivery thread see the same view. Items without an
/// explicit switch fall back to their definition's `enabled` flag.
#[derive(Debug, Clone, Default)]
pub struct LimitsControl {
    overrides: Arc<Mutex<HashMap<ItemKey, bool>>>,
}

impl LimitsControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self, item: &ItemKey) {
        self.set(item, true);
    }

    pub fn disable(&self, item: &ItemKey) {
        self.set(item, false);
    }

    pub fn enable_items<'a>(&self, items: impl IntoIterator<Item = &'a ItemKey>) {
        let mut overrides = self.lock();
        for item in items {
            overrides.insert(item.clone(), true);
        }
    }

    pub fn disable_items<'a>(&self, items: impl IntoIterator<Item = &'a ItemKey>) {
        let mut overrides = self.lock();
        for item in items {
            overrides.insert(item.clone(), false);
        }
    }

    /// Whether `item` is evaluated, given its definition default.
    pub fn is_enabled(&self, item: &ItemKey, default: bool) -> bool {
        self.lock().get(item).copied().unwrap_or(default)
    }

    fn set(&self, item: &ItemKey, enabled: bool) {
        self.lock().insert(item.clone(), enabled);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ItemKey, bool>> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
