use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use groundlink::api::value_to_json;
use groundlink::limits::{ItemKey, LimitsState, LimitsTransition};
use groundlink::packet::{Packet, ValueType};
use groundlink::GroundContext;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ItemRow {
    pub name: String,
    pub raw: serde_json::Value,
    pub value: serde_json::Value,
    pub display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PacketReport {
    pub target: String,
    pub packet: String,
    pub received_count: u64,
    pub length: usize,
    pub buffer: String,
    pub items: Vec<ItemRow>,
    pub transitions: Vec<LimitsTransition>,
}

impl PacketReport {
    /// Every item of `packet` with its limits state in `context`.
    pub fn new(packet: &mut Packet, context: &GroundContext, transitions: &[LimitsTransition]) -> Self {
        let definition = packet.definition().clone();
        let items = definition
            .items()
            .iter()
            .map(|item| {
                let limits = item
                    .limits()
                    .map(|_| context.limits_state(&ItemKey::of(definition.identity(), item.name())));
                let mut row = ItemRow {
                    name: item.name().to_string(),
                    raw: serde_json::Value::Null,
                    value: serde_json::Value::Null,
                    display: String::new(),
                    limits,
                    error: None,
                };
                let read = packet.read(item.name(), ValueType::Raw).and_then(|raw| {
                    let value = packet.read(item.name(), ValueType::Converted)?;
                    let display = packet.read(item.name(), ValueType::WithUnits)?;
                    Ok((raw, value, display))
                });
                match read {
                    Ok((raw, value, display)) => {
                        row.raw = value_to_json(&raw);
                        row.value = value_to_json(&value);
                        row.display = display.to_string();
                    }
                    Err(err) => row.error = Some(err.to_string()),
                }
                row
            })
            .collect();

        Self {
            target: definition.identity().target.clone(),
            packet: definition.identity().packet.clone(),
            received_count: packet.received_count(),
            length: packet.buffer().len(),
            buffer: hex::encode_upper(packet.buffer()),
            items,
            transitions: transitions.to_vec(),
        }
    }
}

pub fn print_packet(report: &PacketReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ITEM", "RAW", "VALUE", "LIMITS"]);
            for item in &report.items {
                table.add_row(vec![
                    item.name.clone(),
                    scalar(&item.raw),
                    item.error.clone().unwrap_or_else(|| item.display.clone()),
                    item.limits.map(|state| state.to_string()).unwrap_or_default(),
                ]);
            }
            println!("{} {} ({} bytes)", report.target, report.packet, report.length);
            println!("{table}");
            print_transitions(&report.transitions);
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} count={} size={} buffer={}",
                report.target, report.packet, report.received_count, report.length, report.buffer
            );
            for item in &report.items {
                match (&item.error, item.limits) {
                    (Some(err), _) => println!("  {} error={err}", item.name),
                    (None, Some(state)) => println!("  {}={} [{state}]", item.name, item.display),
                    (None, None) => println!("  {}={}", item.name, item.display),
                }
            }
            print_transitions(&report.transitions);
        }
    }
}

fn print_transitions(transitions: &[LimitsTransition]) {
    for transition in transitions {
        println!(
            "limits: {} {} -> {} ({})",
            transition.item, transition.previous, transition.current, transition.value
        );
    }
}

#[derive(Debug, Serialize)]
pub struct CommandReport {
    pub target: String,
    pub packet: String,
    pub interface: String,
    pub length: usize,
    pub buffer: String,
}

impl CommandReport {
    pub fn new(packet: &Packet, interface: &str) -> Self {
        Self {
            target: packet.identity().target.clone(),
            packet: packet.identity().packet.clone(),
            interface: interface.to_string(),
            length: packet.buffer().len(),
            buffer: hex::encode_upper(packet.buffer()),
        }
    }
}

pub fn print_command(report: &CommandReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "INTERFACE", "SIZE", "BUFFER"])
                .add_row(vec![
                    format!("{} {}", report.target, report.packet),
                    report.interface.clone(),
                    report.length.to_string(),
                    report.buffer.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} {} on {} size={} buffer={}",
                report.target, report.packet, report.interface, report.length, report.buffer
            );
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FramesReport {
    pub frames: Vec<String>,
    /// Bytes left over that do not form a complete frame.
    pub remainder: usize,
}

pub fn print_frames(report: &FramesReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "BYTES"]);
            for (index, frame) in report.frames.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    (frame.len() / 2).to_string(),
                    frame.clone(),
                ]);
            }
            println!("{table}");
            println!("remainder: {} bytes", report.remainder);
        }
        OutputFormat::Pretty => {
            for frame in &report.frames {
                println!("{frame}");
            }
            println!("remainder={}", report.remainder);
        }
    }
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse hex bytes, ignoring whitespace, an optional `0x` prefix and `:`/`-` separators.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let digits: String = input
        .split_whitespace()
        .map(|word| word.trim_start_matches("0x").trim_start_matches("0X"))
        .flat_map(|word| word.chars().filter(|c| *c != ':' && *c != '-'))
        .collect();
    hex::decode(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_accepts_common_spellings() {
        assert_eq!(parse_hex("0x0A0B").unwrap(), vec![0x0A, 0x0B]);
        assert_eq!(parse_hex("0a 0b\n0c").unwrap(), vec![0x0A, 0x0B, 0x0C]);
        assert_eq!(parse_hex("DE:AD-BE:EF").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(parse_hex("0x0").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn scalar_cells() {
        assert_eq!(scalar(&serde_json::json!("A")), "A");
        assert_eq!(scalar(&serde_json::json!(3)), "3");
        assert_eq!(scalar(&serde_json::Value::Null), "");
    }
}
