use rtuprims_frame::{checksum, ChecksumOrder};
use serde::Serialize;

use crate::cmd::{parse_hex, CrcArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{hex_string, print_record, OutputFormat, Record};

#[derive(Serialize)]
struct CrcOutput {
    len: usize,
    crc: String,
    order: ChecksumOrder,
    wire: String,
}

pub fn run(args: CrcArgs, format: OutputFormat) -> CliResult<i32> {
    let data = parse_hex(&args.data)?;
    let crc = checksum(&data);
    let order = ChecksumOrder::from(args.order);
    let wire = order.to_wire(crc);

    let out = CrcOutput {
        len: data.len(),
        crc: format!("0x{crc:04X}"),
        order,
        wire: hex_string(&wire),
    };
    let fields = vec![
        ("len", out.len.to_string()),
        ("crc", out.crc.clone()),
        ("wire", out.wire.clone()),
    ];
    print_record(
        Record {
            kind: "crc",
            body: &out,
            fields,
            raw: &wire,
        },
        format,
    );
    Ok(SUCCESS)
}
