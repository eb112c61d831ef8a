//! Byte-stream and timer boundaries for serial RTU protocol engines.
//!
//! The protocol engine never touches hardware directly. It consumes two
//! collaborators through the traits defined here:
//! - a [`ByteStream`] that transmits bytes and reports transmit-complete
//! - a [`TimerService`] that schedules single-shot expiries
//!
//! This is the lowest layer of rtuprims. A deterministic in-memory bus
//! ([`SimBus`]) and virtual clock ([`VirtualTimers`]) are provided for tests
//! and demos; [`MonotonicTimers`] and the `serial` feature cover real lines.

pub mod clock;
pub mod error;
pub mod sim;
pub mod traits;

#[cfg(feature = "serial")]
pub mod serial;

pub use clock::{MonotonicTimers, VirtualTimers};
pub use error::{Result, TransportError};
pub use sim::{SimBus, SimPort, Traffic};
pub use traits::{ByteStream, StreamEvent, TimerHandle, TimerService, TransportId};

#[cfg(feature = "serial")]
pub use serial::{open_serial, SerialReader, SerialStream};
