use std::sync::Arc;

use bytes::BytesMut;
use groundlink::packet::{Packet, PacketDefinition};
use groundlink::GroundContext;
use tracing::warn;

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{parse_hex, print_packet, OutputFormat, PacketReport};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let station = args.station.load()?;
    let bytes = parse_hex(&args.hex)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid packet hex: {err}")))?;

    let definition = match &args.packet {
        Some(names) => {
            let [target, packet] = names.as_slice() else {
                return Err(CliError::new(USAGE, "--packet takes TARGET PACKET"));
            };
            station.telemetry.lookup(target, packet).cloned().ok_or_else(|| {
                CliError::new(USAGE, format!("unknown telemetry packet: {target} {packet}"))
            })?
        }
        None => match station.telemetry.identify(&bytes, &args.targets) {
            Some(definition) => Arc::clone(definition),
            None => {
                warn!(length = bytes.len(), "packet not identified");
                Arc::new(PacketDefinition::unknown())
            }
        },
    };

    let context = GroundContext::new(Arc::clone(&station.commands), Arc::clone(&station.telemetry));
    if let Some(set) = &args.limits_set {
        context.limits().set_limits_set(set);
    }

    let mut packet = Packet::bind(definition, BytesMut::from(bytes.as_slice()));
    let transitions = context.deliver(&mut packet);
    let report = PacketReport::new(&mut packet, &context, &transitions);
    print_packet(&report, format);
    Ok(SUCCESS)
}
