//! Master/slave serial RTU messaging with silence-delimited framing.
//!
//! rtuprims runs the request/response side of a Modbus-RTU style serial
//! line: one master per line polls slaves by address, frames end after a
//! baud-derived silence, and every frame carries a CRC16/MODBUS checksum.
//! The engine is event driven and never blocks; it is fed received bytes,
//! transmit-complete notifications and timer expiries by whatever owns the
//! hardware.
//!
//! # Crate Structure
//!
//! - [`transport`] - Byte-stream and timer boundaries, simulated bus, serial port (behind `serial`)
//! - [`frame`] - Checksum, frame codec, function and exception codes
//! - [`engine`] - Channel registry with master and slave state machines

/// Re-export transport types.
pub mod transport {
    pub use rtuprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rtuprims_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use rtuprims_engine::*;
}
