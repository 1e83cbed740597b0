use bytes::BytesMut;
use groundlink::frame::{decode_frame, LengthFraming};

use crate::cmd::FrameArgs;
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{parse_hex, print_frames, FramesReport, OutputFormat};

pub fn run(args: FrameArgs, format: OutputFormat) -> CliResult<i32> {
    let framing = framing(&args)?;
    let stream = parse_hex(&args.hex)
        .map_err(|err| CliError::new(DATA_INVALID, format!("invalid stream hex: {err}")))?;

    let mut buffer = BytesMut::from(stream.as_slice());
    let mut frames = Vec::new();
    while let Some(frame) =
        decode_frame(&mut buffer, &framing).map_err(|err| frame_error("framing failed", err))?
    {
        frames.push(hex::encode_upper(&frame));
    }

    print_frames(
        &FramesReport {
            frames,
            remainder: buffer.len(),
        },
        format,
    );
    Ok(SUCCESS)
}

fn framing(args: &FrameArgs) -> CliResult<LengthFraming> {
    let mut framing = LengthFraming::new(
        args.length_bit_offset,
        args.length_bit_size,
        args.length_value_offset,
    )
    .with_endianness(args.endianness.into());
    framing.bytes_per_count = args.bytes_per_count;
    framing.discard_leading_bytes = args.discard;
    framing.max_length = args.max_length;
    if let Some(sync) = &args.sync {
        let pattern = parse_hex(sync)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid sync hex: {err}")))?;
        framing = framing.with_sync_pattern(pattern);
    }
    framing
        .validate()
        .map_err(|err| frame_error("invalid framing", err))?;
    Ok(framing)
}
