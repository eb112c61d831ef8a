//! Function codes and exception responses.
//!
//! The engine treats function data as opaque; these names exist for logging,
//! CLI output and for building exception replies.

use std::fmt;

pub const READ_COILS: u8 = 0x01;
pub const READ_DISCRETE_INPUTS: u8 = 0x02;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const READ_EXCEPTION_STATUS: u8 = 0x07;
pub const DIAGNOSTICS: u8 = 0x08;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const REPORT_SERVER_ID: u8 = 0x11;
pub const MASK_WRITE_REGISTER: u8 = 0x16;
pub const READ_WRITE_MULTIPLE_REGISTERS: u8 = 0x17;

/// Set on the function code of an exception reply.
pub const EXCEPTION_FLAG: u8 = 0x80;

/// Returns a human-readable name for a function code.
pub fn function_name(function: u8) -> &'static str {
    match function & !EXCEPTION_FLAG {
        READ_COILS => "READ_COILS",
        READ_DISCRETE_INPUTS => "READ_DISCRETE_INPUTS",
        READ_HOLDING_REGISTERS => "READ_HOLDING_REGISTERS",
        READ_INPUT_REGISTERS => "READ_INPUT_REGISTERS",
        WRITE_SINGLE_COIL => "WRITE_SINGLE_COIL",
        WRITE_SINGLE_REGISTER => "WRITE_SINGLE_REGISTER",
        READ_EXCEPTION_STATUS => "READ_EXCEPTION_STATUS",
        DIAGNOSTICS => "DIAGNOSTICS",
        WRITE_MULTIPLE_COILS => "WRITE_MULTIPLE_COILS",
        WRITE_MULTIPLE_REGISTERS => "WRITE_MULTIPLE_REGISTERS",
        REPORT_SERVER_ID => "REPORT_SERVER_ID",
        MASK_WRITE_REGISTER => "MASK_WRITE_REGISTER",
        READ_WRITE_MULTIPLE_REGISTERS => "READ_WRITE_MULTIPLE_REGISTERS",
        _ => "USER",
    }
}

/// Returns true if the function code marks an exception reply.
pub fn is_exception(function: u8) -> bool {
    function & EXCEPTION_FLAG != 0
}

/// Exception code carried in the second byte of an exception reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailed,
    Other(u8),
}

impl ExceptionCode {
    pub fn code(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailed => 0x0B,
            ExceptionCode::Other(code) => code,
        }
    }

    /// Function payload of the exception reply to `function`.
    pub fn reply_pdu(self, function: u8) -> [u8; 2] {
        [function | EXCEPTION_FLAG, self.code()]
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailed,
            other => ExceptionCode::Other(other),
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::ServerDeviceBusy => "server device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailed => "gateway target failed to respond",
            ExceptionCode::Other(code) => return write!(f, "exception 0x{code:02X}"),
        };
        f.write_str(name)
    }
}
