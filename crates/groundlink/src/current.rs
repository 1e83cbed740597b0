use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use groundlink_packet::{DefinitionTable, Packet, PacketIdentity, Value, ValueType};
use tracing::debug;

use crate::error::{GroundError, Result};

/// Latest packet received for each telemetry identity.
///
/// The table owns its copies; delivering threads keep their own packet.
#[derive(Debug, Default)]
pub struct CurrentValueTable {
    packets: Mutex<HashMap<PacketIdentity, Packet>>,
}

impl CurrentValueTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every telemetry packet of `telemetry` with its default
    /// buffer, so items read before any data arrives return initial values.
    pub fn seeded(telemetry: &DefinitionTable) -> Self {
        let mut packets = HashMap::with_capacity(telemetry.len());
        for definition in telemetry.iter() {
            match Packet::command(definition.clone()) {
                Ok(packet) => {
                    packets.insert(definition.identity().clone(), packet);
                }
                Err(err) => {
                    debug!(packet = %definition.identity(), error = %err, "no initial buffer");
                }
            }
        }
        Self {
            packets: Mutex::new(packets),
        }
    }

    fn packets(&self) -> MutexGuard<'_, HashMap<PacketIdentity, Packet>> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `packet` as the latest of its identity. Its received count is
    /// set to one more than the previous packet's, and returned.
    pub fn store(&self, packet: &mut Packet) -> u64 {
        let mut packets = self.packets();
        let count = packets
            .get(packet.identity())
            .map_or(0, Packet::received_count)
            + 1;
        packet.set_received_count(count);
        packets.insert(packet.identity().clone(), packet.clone());
        count
    }

    pub fn received_count(&self, identity: &PacketIdentity) -> u64 {
        self.packets()
            .get(identity)
            .map_or(0, Packet::received_count)
    }

    /// Copy of the latest packet.
    pub fn snapshot(&self, identity: &PacketIdentity) -> Option<Packet> {
        self.packets().get(identity).cloned()
    }

    pub fn read(&self, identity: &PacketIdentity, item: &str, value_type: ValueType) -> Result<Value> {
        let mut packets = self.packets();
        let packet = packets
            .get_mut(identity)
            .ok_or_else(|| GroundError::UnknownPacket(identity.clone()))?;
        Ok(packet.read(item, value_type)?)
    }

    pub fn len(&self) -> usize {
        self.packets().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets().is_empty()
    }
}
