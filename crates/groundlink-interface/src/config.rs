use std::time::Duration;

use groundlink_frame::LengthFraming;
use groundlink_packet::PacketIdentity;
use groundlink_task::TaskSchedule;
use groundlink_transport::TransportConfig;
use serde::{Deserialize, Serialize};

/// Connection parameters for one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub transport: TransportConfig,
    #[serde(default)]
    pub framing: LengthFraming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
    /// Targets whose telemetry arrives on this interface. Empty means all.
    #[serde(default)]
    pub target_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingConfig>,
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            framing: LengthFraming::default(),
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            target_names: Vec::new(),
            polling: None,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }
}

/// Zero means no timeout, like an absent value.
fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}

/// A command packet sent at a fixed rate while the interface is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    pub packet: PacketIdentity,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

impl PollingConfig {
    pub fn new(packet: PacketIdentity, interval: Duration) -> Self {
        Self {
            packet,
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            initial_delay_ms: 0,
        }
    }

    pub fn schedule(&self) -> TaskSchedule {
        TaskSchedule::every(Duration::from_millis(self.interval_ms))
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_takes_defaults() {
        let config: InterfaceConfig = serde_json::from_str(
            r#"{
                "name": "INST_INT",
                "transport": {"type": "tcp", "address": "127.0.0.1:8080"},
                "read_timeout_ms": 500,
                "polling": {"packet": {"target": "INST", "packet": "NOOP"}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.name, "INST_INT");
        assert_eq!(config.framing, LengthFraming::default());
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.write_timeout(), None);
        assert!(config.target_names.is_empty());

        let polling = config.polling.unwrap();
        assert_eq!(polling.packet, PacketIdentity::new("inst", "noop"));
        assert_eq!(polling.schedule().interval, Duration::from_secs(1));
    }

    #[test]
    fn polling_interval_in_milliseconds() {
        let polling = PollingConfig::new(PacketIdentity::new("INST", "NOOP"), Duration::from_millis(250));
        assert_eq!(polling.interval_ms, 250);
        assert_eq!(polling.schedule().initial_delay, Duration::ZERO);
    }
}
