use std::fmt;
use std::sync::Arc;

use groundlink_packet::Packet;

/// Transformation applied to every packet crossing an interface.
///
/// Read hooks see identified telemetry before it is handed out; write hooks
/// see a copy of each outbound packet before it is framed.
pub trait PacketHook: Send + Sync {
    fn apply(&self, packet: Packet) -> Packet;
}

impl<F> PacketHook for F
where
    F: Fn(Packet) -> Packet + Send + Sync,
{
    fn apply(&self, packet: Packet) -> Packet {
        self(packet)
    }
}

/// Hooks applied in the order they were added.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn PacketHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: impl PacketHook + 'static) {
        self.hooks.push(Arc::new(hook));
    }

    pub fn apply(&self, packet: Packet) -> Packet {
        self.hooks
            .iter()
            .fold(packet, |packet, hook| hook.apply(packet))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("len", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::BytesMut;
    use groundlink_packet::{DataType, ItemDefinition, PacketDefinition, Value, ValueType};

    use super::*;

    #[test]
    fn hooks_run_in_order() {
        let definition = PacketDefinition::define(
            "INST",
            "COUNTER",
            vec![ItemDefinition::new("COUNT", 0, 8, DataType::Uint)],
        )
        .unwrap();
        let packet = Packet::bind(Arc::new(definition), BytesMut::zeroed(1));

        let mut chain = HookChain::new();
        chain.push(|mut packet: Packet| {
            packet.write("COUNT", &Value::Uint(3), ValueType::Raw).unwrap();
            packet
        });
        chain.push(|mut packet: Packet| {
            let count = packet.read_raw("COUNT").unwrap();
            let doubled = Value::Uint(count.as_i128().unwrap() as u64 * 2);
            packet.write("COUNT", &doubled, ValueType::Raw).unwrap();
            packet
        });

        assert_eq!(chain.len(), 2);
        let packet = chain.apply(packet);
        assert_eq!(packet.buffer(), &[6]);
    }
}
