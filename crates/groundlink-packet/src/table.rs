use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::definition::{PacketDefinition, PacketIdentity};

/// Definitions keyed by target and packet name.
#[derive(Debug, Default, Clone)]
pub struct DefinitionTable {
    definitions: BTreeMap<PacketIdentity, Arc<PacketDefinition>>,
}

impl DefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, returning the one it replaced.
    pub fn insert(&mut self, definition: PacketDefinition) -> Option<Arc<PacketDefinition>> {
        let identity = definition.identity().clone();
        debug!(packet = %identity, items = definition.items().len(), "definition registered");
        self.definitions.insert(identity, Arc::new(definition))
    }

    pub fn get(&self, identity: &PacketIdentity) -> Option<&Arc<PacketDefinition>> {
        self.definitions.get(identity)
    }

    /// Case-insensitive lookup by target and packet name.
    pub fn lookup(&self, target: &str, packet: &str) -> Option<&Arc<PacketDefinition>> {
        self.definitions.get(&PacketIdentity::new(target, packet))
    }

    /// Find the definition a raw buffer belongs to, searching only `targets`
    /// (every target when empty).
    ///
    /// Definitions with id items are tried first. A definition without id items
    /// matches anything, so it is only chosen when no id-bearing definition of
    /// the searched targets matches.
    pub fn identify(&self, buffer: &[u8], targets: &[String]) -> Option<&Arc<PacketDefinition>> {
        let searched = || {
            self.definitions.values().filter(|definition| {
                targets.is_empty()
                    || targets
                        .iter()
                        .any(|target| target.eq_ignore_ascii_case(definition.target_name()))
            })
        };

        searched()
            .filter(|definition| definition.has_id_items())
            .find(|definition| definition.identify(buffer))
            .or_else(|| searched().find(|definition| !definition.has_id_items()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PacketDefinition>> {
        self.definitions.values()
    }

    /// Distinct target names, sorted.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self
            .definitions
            .keys()
            .map(|identity| identity.target.as_str())
            .collect();
        targets.dedup();
        targets
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
