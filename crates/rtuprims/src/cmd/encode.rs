use rtuprims_frame::function::function_name;
use rtuprims_frame::timing::{silence_interval, transmission_time};
use rtuprims_frame::FrameConfig;
use serde::Serialize;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{hex_string, micros, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct EncodeOutput {
    address: u8,
    function: u8,
    function_name: &'static str,
    frame: String,
    size: usize,
    baud: u32,
    transmission_us: u64,
    silence_us: u64,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let pdu = parse_hex(&args.pdu)?;
    let config = FrameConfig {
        checksum_order: args.order.into(),
    };
    let wire = config
        .encode(args.address, &pdu)
        .map_err(|err| frame_error("encode failed", err))?;

    let out = EncodeOutput {
        address: args.address,
        function: pdu[0],
        function_name: function_name(pdu[0]),
        frame: hex_string(&wire),
        size: wire.len(),
        baud: args.baud,
        transmission_us: micros(transmission_time(wire.len(), args.baud)),
        silence_us: micros(silence_interval(args.baud)),
    };
    let fields = vec![
        ("address", out.address.to_string()),
        ("function", format!("0x{:02X} ({})", out.function, out.function_name)),
        ("frame", out.frame.clone()),
        ("size", out.size.to_string()),
        ("transmission_us", out.transmission_us.to_string()),
        ("silence_us", out.silence_us.to_string()),
    ];
    print_record(
        Record {
            kind: "frame-encoded",
            body: &out,
            fields,
            raw: &wire,
        },
        format,
    );
    Ok(SUCCESS)
}
