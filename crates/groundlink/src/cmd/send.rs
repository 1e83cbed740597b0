use std::sync::Arc;

use groundlink::api::item_value_from_json;
use groundlink::codec::{DataType, Value};
use groundlink::packet::PacketDefinition;
use groundlink::{GroundContext, Station};
use tracing::info;

use crate::cmd::SendArgs;
use crate::exit::{connection_error, ground_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{print_command, CommandReport, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let station = args.station.load()?;
    let context = GroundContext::new(Arc::clone(&station.commands), Arc::clone(&station.telemetry));

    let definition = context
        .command_definition(&args.target, &args.packet)
        .map_err(|err| ground_error("send failed", err))?;
    let params = args
        .set
        .iter()
        .map(|assignment| parse_param(definition, assignment))
        .collect::<CliResult<Vec<_>>>()?;
    let params: Vec<(&str, Value)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();
    let command = context
        .build_command(&args.target, &args.packet, &params)
        .map_err(|err| ground_error("command build failed", err))?;

    if args.dry_run {
        print_command(&CommandReport::new(&command, "-"), format);
        return Ok(SUCCESS);
    }

    let name = interface_name(&station, &args)?;
    let mut interface = station
        .interface(&name)
        .map_err(|err| ground_error("interface setup failed", err))?
        .ok_or_else(|| CliError::new(USAGE, format!("unknown interface: {name}")))?;
    // No polling on a one-shot connection.
    interface.stop_polling();
    interface
        .connect()
        .map_err(|err| connection_error("connect failed", err))?;
    let written = interface.write_packet(&command);
    interface.disconnect();
    written.map_err(|err| connection_error("write failed", err))?;

    info!(interface = %interface.name(), command = %command.identity(), "command sent");
    print_command(&CommandReport::new(&command, interface.name()), format);
    Ok(SUCCESS)
}

fn interface_name(station: &Station, args: &SendArgs) -> CliResult<String> {
    if let Some(name) = &args.interface {
        return Ok(name.clone());
    }
    station
        .interfaces
        .iter()
        .find(|interface| {
            interface.target_names.is_empty()
                || interface
                    .target_names
                    .iter()
                    .any(|target| target.eq_ignore_ascii_case(&args.target))
        })
        .map(|interface| interface.name.clone())
        .ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("no interface serves target {}", args.target.to_ascii_uppercase()),
            )
        })
}

/// `ITEM=VALUE`, typed by the item's definition. Numbers and state names are
/// accepted everywhere they make sense; blocks take hex.
fn parse_param(definition: &PacketDefinition, assignment: &str) -> CliResult<(String, Value)> {
    let (name, text) = assignment
        .split_once('=')
        .ok_or_else(|| CliError::new(USAGE, format!("expected ITEM=VALUE, got {assignment}")))?;
    let name = name.trim();
    let item = definition.item(name).ok_or_else(|| {
        CliError::new(
            USAGE,
            format!("{} has no item {name}", definition.identity()),
        )
    })?;

    let value = match item.data_type() {
        DataType::String => Some(Value::from(text)),
        DataType::Int | DataType::Uint => match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(digits) => u64::from_str_radix(digits, 16).ok().map(Value::Uint),
            None => item_value_from_json(&json_scalar(text), item.data_type()),
        },
        data_type => item_value_from_json(&json_scalar(text), data_type),
    };
    value
        .map(|value| (name.to_string(), value))
        .ok_or_else(|| CliError::new(DATA_INVALID, format!("invalid value for {name}: {text}")))
}

fn json_scalar(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use groundlink::packet::ItemDefinition;

    use super::*;

    fn collect() -> PacketDefinition {
        PacketDefinition::define(
            "INST",
            "COLLECT",
            vec![
                ItemDefinition::new("TYPE", 0, 16, DataType::Uint)
                    .with_state("NORMAL", 0u64)
                    .with_state("SPECIAL", 1u64),
                ItemDefinition::new("DURATION", 16, 32, DataType::Float),
                ItemDefinition::new("LABEL", 48, 32, DataType::String),
                ItemDefinition::new("KEY", 80, 16, DataType::Block),
            ],
        )
        .unwrap()
    }

    #[test]
    fn params_follow_item_types() {
        let definition = collect();
        assert_eq!(
            parse_param(&definition, "type=SPECIAL").unwrap(),
            ("type".to_string(), Value::from("SPECIAL"))
        );
        assert_eq!(
            parse_param(&definition, "TYPE=0x10").unwrap().1,
            Value::Uint(16)
        );
        assert_eq!(
            parse_param(&definition, "DURATION=1.5").unwrap().1,
            Value::Float(1.5)
        );
        assert_eq!(
            parse_param(&definition, "LABEL=123").unwrap().1,
            Value::from("123")
        );
        assert_eq!(
            parse_param(&definition, "KEY=0xBEEF").unwrap().1,
            Value::from(vec![0xBE, 0xEF])
        );
    }

    #[test]
    fn bad_params_are_rejected() {
        let definition = collect();
        assert_eq!(parse_param(&definition, "TYPE").unwrap_err().code, USAGE);
        assert_eq!(parse_param(&definition, "MISSING=1").unwrap_err().code, USAGE);
        assert_eq!(parse_param(&definition, "TYPE=0xZZ").unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_param(&definition, "KEY=XYZ").unwrap_err().code, DATA_INVALID);
    }
}
