//! Entry points for a remote-call gateway.
//!
//! The gateway owns the transport and authentication; this module only
//! refuses methods outside [`METHOD_WHITELIST`] and maps JSON parameters
//! onto the ground context.

use std::sync::Arc;

use groundlink_limits::{ItemKey, LimitsState};
use groundlink_packet::{DataType, Packet, PacketIdentity, Value, ValueType};
use serde_json::{json, Map};

use crate::context::GroundContext;
use crate::error::{GroundError, Result};

/// Methods a remote caller may invoke through [`Api::call`].
pub const METHOD_WHITELIST: &[&str] = &[
    "cmd",
    "build_cmd",
    "tlm",
    "tlm_raw",
    "tlm_formatted",
    "tlm_with_units",
    "get_tlm_cnt",
    "limits_state",
    "get_out_of_limits",
    "enable_limits",
    "disable_limits",
    "get_limits_set",
    "set_limits_set",
    "get_limits_groups",
    "enable_limits_group",
    "disable_limits_group",
];

pub fn is_whitelisted(method: &str) -> bool {
    METHOD_WHITELIST.contains(&method)
}

/// Command and telemetry operations over a shared [`GroundContext`].
#[derive(Debug, Clone)]
pub struct Api {
    context: Arc<GroundContext>,
}

impl Api {
    pub fn new(context: Arc<GroundContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<GroundContext> {
        &self.context
    }

    /// Build a command and send it on the interface serving its target.
    pub fn cmd(&self, target: &str, packet: &str, params: &[(&str, Value)]) -> Result<Packet> {
        let command = self.context.build_command(target, packet, params)?;
        self.context.send_command(&command)?;
        Ok(command)
    }

    /// Build a command without sending it.
    pub fn build_cmd(&self, target: &str, packet: &str, params: &[(&str, Value)]) -> Result<Packet> {
        self.context.build_command(target, packet, params)
    }

    pub fn tlm(&self, target: &str, packet: &str, item: &str) -> Result<Value> {
        self.read(target, packet, item, ValueType::Converted)
    }

    pub fn tlm_raw(&self, target: &str, packet: &str, item: &str) -> Result<Value> {
        self.read(target, packet, item, ValueType::Raw)
    }

    pub fn tlm_formatted(&self, target: &str, packet: &str, item: &str) -> Result<Value> {
        self.read(target, packet, item, ValueType::Formatted)
    }

    pub fn tlm_with_units(&self, target: &str, packet: &str, item: &str) -> Result<Value> {
        self.read(target, packet, item, ValueType::WithUnits)
    }

    /// Number of packets received for a telemetry packet.
    pub fn tlm_cnt(&self, target: &str, packet: &str) -> u64 {
        self.context
            .current()
            .received_count(&PacketIdentity::new(target, packet))
    }

    pub fn limits_state(&self, target: &str, packet: &str, item: &str) -> LimitsState {
        self.context
            .limits_state(&ItemKey::new(target, packet, item))
    }

    fn read(&self, target: &str, packet: &str, item: &str, value_type: ValueType) -> Result<Value> {
        self.context
            .current()
            .read(&PacketIdentity::new(target, packet), item, value_type)
    }

    /// Dispatch a whitelisted method with JSON parameters.
    ///
    /// Item methods take `{"target", "packet", "item"}`; `cmd` and
    /// `build_cmd` take `{"target", "packet", "params": {ITEM: value}}`.
    pub fn call(&self, method: &str, params: &serde_json::Value) -> Result<serde_json::Value> {
        if !is_whitelisted(method) {
            return Err(GroundError::NotWhitelisted(method.to_string()));
        }
        let args = Args { method, params };

        match method {
            "cmd" | "build_cmd" => {
                let (target, packet) = (args.str("target")?, args.str("packet")?);
                let values = args.command_params()?;
                let params: Vec<(&str, Value)> = values
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.clone()))
                    .collect();
                let command = if method == "cmd" {
                    self.cmd(target, packet, &params)?
                } else {
                    self.build_cmd(target, packet, &params)?
                };
                Ok(json!({
                    "target": command.identity().target,
                    "packet": command.identity().packet,
                    "buffer": hex::encode_upper(command.buffer()),
                }))
            }
            "tlm" | "tlm_raw" | "tlm_formatted" | "tlm_with_units" => {
                let value_type = match method {
                    "tlm_raw" => ValueType::Raw,
                    "tlm_formatted" => ValueType::Formatted,
                    "tlm_with_units" => ValueType::WithUnits,
                    _ => ValueType::Converted,
                };
                let value = self.read(
                    args.str("target")?,
                    args.str("packet")?,
                    args.str("item")?,
                    value_type,
                )?;
                Ok(value_to_json(&value))
            }
            "get_tlm_cnt" => Ok(json!(self.tlm_cnt(args.str("target")?, args.str("packet")?))),
            "limits_state" => {
                let state = self.limits_state(
                    args.str("target")?,
                    args.str("packet")?,
                    args.str("item")?,
                );
                Ok(json!(state))
            }
            "get_out_of_limits" => Ok(serde_json::to_value(
                self.context.limits().out_of_limits(),
            )?),
            "enable_limits" | "disable_limits" => {
                let key = ItemKey::new(args.str("target")?, args.str("packet")?, args.str("item")?);
                let limits = self.context.limits();
                if method == "enable_limits" {
                    limits.enable_item(&key);
                } else {
                    limits.disable_item(&key);
                }
                Ok(serde_json::Value::Null)
            }
            "get_limits_set" => Ok(json!(self.context.limits().limits_set())),
            "set_limits_set" => {
                self.context.limits().set_limits_set(args.str("name")?);
                Ok(serde_json::Value::Null)
            }
            "get_limits_groups" => Ok(json!(self.context.limits_group_names())),
            "enable_limits_group" | "disable_limits_group" => {
                let group = args.str("group")?;
                let known = if method == "enable_limits_group" {
                    self.context.enable_limits_group(group)
                } else {
                    self.context.disable_limits_group(group)
                };
                if !known {
                    return Err(args.invalid(format!("unknown limits group {group}")));
                }
                Ok(serde_json::Value::Null)
            }
            _ => Err(GroundError::NotWhitelisted(method.to_string())),
        }
    }
}

struct Args<'a> {
    method: &'a str,
    params: &'a serde_json::Value,
}

impl<'a> Args<'a> {
    fn invalid(&self, reason: impl Into<String>) -> GroundError {
        GroundError::InvalidParams {
            method: self.method.to_string(),
            reason: reason.into(),
        }
    }

    fn str(&self, name: &str) -> Result<&'a str> {
        self.params
            .get(name)
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| self.invalid(format!("missing string parameter {name}")))
    }

    fn command_params(&self) -> Result<Vec<(String, Value)>> {
        let Some(params) = self.params.get("params") else {
            return Ok(Vec::new());
        };
        let params: &Map<String, serde_json::Value> = params
            .as_object()
            .ok_or_else(|| self.invalid("params must be an object"))?;
        params
            .iter()
            .map(|(name, value)| {
                value_from_json(value)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| self.invalid(format!("unsupported value for {name}")))
            })
            .collect()
    }
}

/// Integer, float or string value of a JSON scalar.
pub fn value_from_json(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::Number(number) => number
            .as_i64()
            .map(Value::Int)
            .or_else(|| number.as_u64().map(Value::Uint))
            .or_else(|| number.as_f64().map(Value::Float)),
        serde_json::Value::String(text) => Some(Value::String(text.clone())),
        _ => None,
    }
}

/// Like [`value_from_json`], but a string for a BLOCK item holds hex bytes.
pub fn item_value_from_json(value: &serde_json::Value, data_type: DataType) -> Option<Value> {
    match (value, data_type) {
        (serde_json::Value::String(text), DataType::Block) => {
            let digits = text.trim_start_matches("0x").trim_start_matches("0X");
            hex::decode(digits).ok().map(Value::from)
        }
        _ => value_from_json(value),
    }
}

/// JSON form of a value. Blocks become upper-case hex; non-finite floats
/// become null.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Int(v) => json!(v),
        Value::Uint(v) => json!(v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => json!(s),
        Value::Block(bytes) => json!(hex::encode_upper(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use groundlink_packet::{
        DefinitionTable, ItemDefinition, LimitsDefinition, PacketDefinition, PolynomialConversion,
        Thresholds,
    };

    use super::*;

    fn context() -> GroundContext {
        let mut commands = DefinitionTable::new();
        commands.insert(
            PacketDefinition::define(
                "INST",
                "NOOP",
                vec![
                    ItemDefinition::new("LENGTH", 0, 16, DataType::Uint),
                    ItemDefinition::new("OPCODE", 16, 8, DataType::Uint).with_id_value(9u64),
                    ItemDefinition::new("ARG", 24, 8, DataType::Uint),
                ],
            )
            .unwrap(),
        );
        let mut telemetry = DefinitionTable::new();
        telemetry.insert(
            PacketDefinition::define(
                "INST",
                "HEALTH",
                vec![ItemDefinition::new("TEMP", 0, 16, DataType::Uint)
                    .with_read_conversion(PolynomialConversion::new([0.0, 0.5]))
                    .with_format_string("%.1f")
                    .with_units("C")
                    .with_limits(LimitsDefinition::new(Thresholds::new(
                        -10.0, 0.0, 40.0, 50.0,
                    )))],
            )
            .unwrap(),
        );
        GroundContext::new(Arc::new(commands), Arc::new(telemetry))
    }

    fn deliver_temp(context: &GroundContext, raw: u16) {
        let definition = Arc::clone(context.telemetry().lookup("INST", "HEALTH").unwrap());
        let mut packet = Packet::bind(definition, BytesMut::from(&raw.to_be_bytes()[..]));
        context.deliver(&mut packet);
    }

    #[test]
    fn whitelist_gates_calls() {
        let api = Api::new(Arc::new(context()));
        assert!(is_whitelisted("tlm"));
        assert!(!is_whitelisted("shutdown"));

        let err = api.call("shutdown", &json!({})).unwrap_err();
        assert!(matches!(err, GroundError::NotWhitelisted(method) if method == "shutdown"));
    }

    #[test]
    fn telemetry_in_every_representation() {
        let api = Api::new(Arc::new(context()));
        deliver_temp(api.context(), 60);

        assert_eq!(api.tlm_raw("INST", "HEALTH", "TEMP").unwrap(), Value::Uint(60));
        assert_eq!(api.tlm("inst", "health", "temp").unwrap(), Value::Float(30.0));
        assert_eq!(
            api.tlm_formatted("INST", "HEALTH", "TEMP").unwrap(),
            Value::from("30.0")
        );
        assert_eq!(
            api.tlm_with_units("INST", "HEALTH", "TEMP").unwrap(),
            Value::from("30.0 C")
        );
        assert_eq!(api.tlm_cnt("INST", "HEALTH"), 1);
        assert_eq!(api.limits_state("INST", "HEALTH", "TEMP"), LimitsState::Green);
    }

    #[test]
    fn json_calls_map_onto_context() {
        let api = Api::new(Arc::new(context()));
        deliver_temp(api.context(), 90);
        let item = json!({"target": "INST", "packet": "HEALTH", "item": "TEMP"});

        assert_eq!(api.call("tlm", &item).unwrap(), json!(45.0));
        assert_eq!(api.call("limits_state", &item).unwrap(), json!("YELLOW_HIGH"));
        let out = api.call("get_out_of_limits", &json!({})).unwrap();
        assert_eq!(out.as_array().map(Vec::len), Some(1));

        api.call("set_limits_set", &json!({"name": "tvac"})).unwrap();
        assert_eq!(api.call("get_limits_set", &json!({})).unwrap(), json!("TVAC"));

        let err = api.call("tlm", &json!({"target": "INST"})).unwrap_err();
        assert!(matches!(err, GroundError::InvalidParams { .. }));
        let err = api
            .call("enable_limits_group", &json!({"group": "NONE"}))
            .unwrap_err();
        assert!(matches!(err, GroundError::InvalidParams { .. }));
    }

    #[test]
    fn build_cmd_returns_encoded_buffer() {
        let api = Api::new(Arc::new(context()));
        let built = api
            .call(
                "build_cmd",
                &json!({"target": "INST", "packet": "NOOP", "params": {"ARG": 7}}),
            )
            .unwrap();
        assert_eq!(built["buffer"], json!("00000907"));

        let err = api
            .call(
                "build_cmd",
                &json!({"target": "INST", "packet": "NOOP", "params": {"ARG": [1]}}),
            )
            .unwrap_err();
        assert!(matches!(err, GroundError::InvalidParams { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn cmd_is_written_to_the_routed_interface() {
        use std::os::unix::net::UnixStream;

        use groundlink_frame::{FrameReader, LengthFraming};
        use groundlink_interface::{Interface, InterfaceConfig};
        use groundlink_transport::{LinkStream, TransportConfig};

        let context = Arc::new(context());
        let commands = Arc::clone(context.commands());
        let telemetry = Arc::clone(context.telemetry());
        let config = InterfaceConfig::new(
            "INST_INT",
            TransportConfig::Unix {
                path: "/nonexistent/groundlink/inst.sock".into(),
            },
        );
        let mut interface = Interface::new(config, telemetry, commands).unwrap();
        let (near, far) = UnixStream::pair().unwrap();
        interface.connect_with(LinkStream::from_unix(near)).unwrap();
        context.register_interface(interface.handle(), &["INST".to_string()]);

        let api = Api::new(Arc::clone(&context));
        let sent = api.cmd("INST", "NOOP", &[("ARG", Value::Uint(3))]).unwrap();
        assert_eq!(sent.buffer(), &[0, 0, 9, 3]);

        let mut reader = FrameReader::new(LinkStream::from_unix(far), LengthFraming::default());
        assert_eq!(reader.read_frame().unwrap().as_ref(), &[0, 4, 9, 3]);

        context.unregister_interface("INST_INT");
        assert!(matches!(
            api.cmd("INST", "NOOP", &[]),
            Err(GroundError::NoInterface(_))
        ));
    }

    #[test]
    fn json_values() {
        assert_eq!(value_from_json(&json!(-3)), Some(Value::Int(-3)));
        assert_eq!(value_from_json(&json!(u64::MAX)), Some(Value::Uint(u64::MAX)));
        assert_eq!(value_from_json(&json!(2.5)), Some(Value::Float(2.5)));
        assert_eq!(value_from_json(&json!(null)), None);
        assert_eq!(
            item_value_from_json(&json!("0xCAFE"), DataType::Block),
            Some(Value::from(vec![0xCA, 0xFE]))
        );
        assert_eq!(value_to_json(&Value::Float(f64::NAN)), serde_json::Value::Null);
        assert_eq!(value_to_json(&Value::from(vec![1u8, 2])), json!("0102"));
    }
}
