//! RTU wire framing for serial master/slave buses.
//!
//! Every frame on the wire is:
//! - a 1-byte node address (0 = broadcast, 1-247 = unicast)
//! - a function code followed by function data (1-253 bytes)
//! - a 2-byte CRC16/MODBUS checksum
//!
//! Frames carry no length or delimiter. Boundaries come from line silence,
//! whose duration is derived from the baud rate in [`timing`].

pub mod codec;
pub mod crc;
pub mod error;
pub mod function;
pub mod timing;

pub use codec::{
    decode_frame, encode_frame, validate_address, Frame, FrameConfig, BROADCAST, CHECKSUM_SIZE,
    MAX_FRAME, MAX_PDU, MAX_UNICAST, MIN_FRAME,
};
pub use crc::{checksum, verify, ChecksumOrder};
pub use error::{FrameError, Result};
pub use function::{function_name, is_exception, ExceptionCode, EXCEPTION_FLAG};
pub use timing::silence_interval;
