use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};
use rtuprims_frame::ChecksumOrder;

use crate::exit::{hex_error, CliResult};
use crate::output::OutputFormat;

pub mod bank;
pub mod crc;
pub mod decode;
pub mod encode;
#[cfg(feature = "serial")]
pub mod serial;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute the CRC16/MODBUS checksum of hex bytes.
    Crc(CrcArgs),
    /// Build a wire frame from an address and a function/data payload.
    Encode(EncodeArgs),
    /// Validate and split a wire frame.
    Decode(DecodeArgs),
    /// Run a master and a register-bank slave on a simulated line.
    Simulate(SimulateArgs),
    /// Send one request over a serial port and print the reply.
    #[cfg(feature = "serial")]
    Master(MasterArgs),
    /// Serve a register bank on a serial port until interrupted.
    #[cfg(feature = "serial")]
    Slave(SlaveArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Crc(args) => crc::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        #[cfg(feature = "serial")]
        Command::Master(args) => serial::run_master(args, format),
        #[cfg(feature = "serial")]
        Command::Slave(args) => serial::run_slave(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Checksum byte order on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    /// Low byte first (standard Modbus RTU).
    #[default]
    LowFirst,
    /// High byte first.
    HighFirst,
}

impl From<OrderArg> for ChecksumOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::LowFirst => ChecksumOrder::LowFirst,
            OrderArg::HighFirst => ChecksumOrder::HighFirst,
        }
    }
}

/// Parse hex bytes, tolerating a `0x` prefix and space, `:` or `-` separators.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-' | '_'))
        .collect();
    hex::decode(digits).map_err(|err| hex_error("invalid hex input", err))
}

#[derive(Args, Debug)]
pub struct CrcArgs {
    /// Bytes to checksum, as hex.
    pub data: String,
    /// Checksum byte order for the `wire` field.
    #[arg(long, value_enum, default_value_t = OrderArg::LowFirst)]
    pub order: OrderArg,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Destination address (0 broadcast, 1-247 unicast).
    #[arg(long, short = 'a')]
    pub address: u8,
    /// Function code followed by data, as hex.
    pub pdu: String,
    #[arg(long, value_enum, default_value_t = OrderArg::LowFirst)]
    pub order: OrderArg,
    /// Line speed used for the timing figures.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Received bytes, as hex. One leading noise byte is tolerated.
    pub frame: String,
    #[arg(long, value_enum, default_value_t = OrderArg::LowFirst)]
    pub order: OrderArg,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// JSON file with `engine` and `line` settings. Flags override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Line speed; sets the silence interval.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Master response timeout in milliseconds.
    #[arg(long, value_name = "MS")]
    pub response_timeout_ms: Option<u64>,
    #[arg(long, value_enum)]
    pub order: Option<OrderArg>,
    /// Address the simulated slave answers to.
    #[arg(long, default_value_t = 0x11)]
    pub slave_address: u8,
    /// Number of registers in the slave's bank. Register N starts out holding N.
    #[arg(long, default_value_t = 64)]
    pub registers: u16,
    /// Destination of the master's requests. Defaults to the slave address.
    #[arg(long, conflicts_with = "broadcast")]
    pub target: Option<u8>,
    /// Send to address 0. Slaves ignore broadcasts, so no reply is expected.
    #[arg(long)]
    pub broadcast: bool,
    /// Function code: 3/4 read, 6 write single, 16 write multiple.
    #[arg(long, default_value_t = 3, conflicts_with = "pdu")]
    pub function: u8,
    /// First register.
    #[arg(long, default_value_t = 0, conflicts_with = "pdu")]
    pub start: u16,
    /// Register count for reads and multiple writes.
    #[arg(long, default_value_t = 2, conflicts_with = "pdu")]
    pub count: u16,
    /// Value written by write functions.
    #[arg(long, default_value_t = 0, conflicts_with = "pdu")]
    pub value: u16,
    /// Raw request payload (function and data) as hex.
    #[arg(long)]
    pub pdu: Option<String>,
    /// Number of exchanges to run.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Put one noise byte on the line ahead of every request.
    #[arg(long)]
    pub noise: bool,
}

#[cfg(feature = "serial")]
#[derive(Args, Debug)]
pub struct MasterArgs {
    /// Serial device, e.g. /dev/ttyUSB0 or COM3.
    #[arg(long, short = 'p')]
    pub port: String,
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Destination address.
    #[arg(long, short = 'a')]
    pub address: u8,
    /// Request payload (function and data) as hex.
    pub pdu: String,
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub response_timeout_ms: u64,
    #[arg(long, value_enum, default_value_t = OrderArg::LowFirst)]
    pub order: OrderArg,
}

#[cfg(feature = "serial")]
#[derive(Args, Debug)]
pub struct SlaveArgs {
    #[arg(long, short = 'p')]
    pub port: String,
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
    /// Own address (1-247).
    #[arg(long, short = 'a')]
    pub address: u8,
    #[arg(long, default_value_t = 64)]
    pub registers: u16,
    #[arg(long, value_enum, default_value_t = OrderArg::LowFirst)]
    pub order: OrderArg,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_input_accepts_common_separators() {
        assert_eq!(parse_hex("0x11 03:00-00").unwrap(), vec![0x11, 0x03, 0x00, 0x00]);
        assert_eq!(parse_hex("0A0b").unwrap(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn odd_length_hex_is_rejected() {
        let err = parse_hex("123").unwrap_err();
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
