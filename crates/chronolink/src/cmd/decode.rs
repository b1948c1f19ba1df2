use chronolink_protocol::{DeviceId, FrameParser};

use crate::cmd::DecodeArgs;
use crate::exit::{protocol_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame = parse_hex(&args.hex)?;
    let parser = match &args.local_id {
        Some(id) => {
            let id: DeviceId = id
                .parse()
                .map_err(|err| protocol_error("invalid --local-id", err))?;
            FrameParser::for_device(id)
        }
        None => FrameParser::new(),
    };

    let envelope = parser
        .try_parse(&frame)
        .map_err(|err| protocol_error("decode failed", err))?;
    print_envelope(&envelope, &frame, format);
    Ok(SUCCESS)
}

/// Hex text to bytes, ignoring whitespace and `:`/`-` separators.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && !matches!(b, b':' | b'-'))
        .collect();
    let digits = match digits.strip_prefix(b"0x") {
        Some(rest) => rest,
        None => digits.as_slice(),
    };
    if digits.is_empty() {
        return Err(CliError::new(DATA_INVALID, "frame hex must not be empty"));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("odd number of hex digits ({})", digits.len()),
        ));
    }

    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).unwrap_or("");
            u8::from_str_radix(text, 16)
                .map_err(|_| CliError::new(DATA_INVALID, format!("invalid hex byte {text:?}")))
        })
        .collect()
}
