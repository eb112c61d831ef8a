use rtuprims_frame::function::function_name;
use rtuprims_frame::FrameConfig;
use serde::Serialize;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{hex_string, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct DecodeOutput {
    address: u8,
    broadcast: bool,
    function: u8,
    function_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<String>,
    data: String,
    /// Leading bytes skipped before the frame.
    skipped: usize,
}

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = parse_hex(&args.frame)?;
    let config = FrameConfig {
        checksum_order: args.order.into(),
    };
    let frame = config
        .decode(&raw)
        .map_err(|err| frame_error("decode failed", err))?;

    let function = frame.function();
    let out = DecodeOutput {
        address: frame.address,
        broadcast: frame.is_broadcast(),
        function,
        function_name: function_name(function),
        exception: frame.exception().map(|code| code.to_string()),
        data: hex_string(frame.data()),
        skipped: raw.len() - frame.wire_size(),
    };
    let mut fields = vec![
        ("address", out.address.to_string()),
        ("function", format!("0x{function:02X} ({})", out.function_name)),
        ("data", out.data.clone()),
    ];
    if let Some(exception) = &out.exception {
        fields.push(("exception", exception.clone()));
    }
    if out.skipped > 0 {
        fields.push(("skipped", out.skipped.to_string()));
    }
    print_record(
        Record {
            kind: "frame-decoded",
            body: &out,
            fields,
            raw: &frame.pdu,
        },
        format,
    );
    Ok(SUCCESS)
}
