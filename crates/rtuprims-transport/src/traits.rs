use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Identity of one byte-stream binding.
///
/// Events delivered by a transport carry this identity so the engine can
/// route them to the one channel bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u32);

impl TransportId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tp{}", self.0)
    }
}

/// A buffered, half-duplex byte stream.
///
/// `send` queues bytes and returns immediately. Completion is reported later
/// as a [`StreamEvent::TxComplete`] carrying this stream's [`TransportId`];
/// received characters arrive as [`StreamEvent::Byte`]. Neither notification
/// is ever delivered from inside `send`.
pub trait ByteStream {
    /// The identity events from this stream are tagged with.
    fn id(&self) -> TransportId;

    /// Queue bytes for transmission.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn id(&self) -> TransportId {
        (**self).id()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).send(bytes)
    }
}

/// Notification produced by a byte-stream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// One character was received.
    Byte { transport: TransportId, byte: u8 },
    /// Everything queued by the last `send` has left the wire.
    TxComplete { transport: TransportId },
}

impl StreamEvent {
    pub fn transport(&self) -> TransportId {
        match self {
            StreamEvent::Byte { transport, .. } | StreamEvent::TxComplete { transport } => {
                *transport
            }
        }
    }
}

/// Handle to one scheduled expiry.
///
/// Handles are never reused by a service, so an expiry for a cancelled or
/// replaced timer cannot be mistaken for a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer{}", self.0)
    }
}

/// Single-shot timer scheduling.
///
/// Expiries are not delivered through this trait; the driver that owns the
/// service collects expired handles and feeds them back to the engine.
pub trait TimerService {
    /// Schedule a single-shot expiry `duration` from now.
    fn start(&mut self, duration: Duration) -> TimerHandle;

    /// Cancel a pending expiry. Cancelling an unknown or fired handle is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}
