//! Channel identity, observable state, and the per-event I/O context the
//! state machines act through.

use std::fmt;

use bytes::{BufMut, BytesMut};
use rtuprims_frame::{Frame, FrameError, MAX_FRAME};
use rtuprims_transport::{ByteStream, TimerHandle, TimerService};
use serde::Serialize;
use tracing::{error, trace, warn};

use crate::config::{Activity, LineConfig, StatusSink};
use crate::error::Result;

/// Receive buffer bound: one full frame plus one leading noise byte.
pub const RX_CAPACITY: usize = MAX_FRAME + 1;

/// Generation-checked handle to a reserved channel.
///
/// The slot index is reused after release, the generation is not, so a
/// handle kept past `release` can never address the next reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId {
    index: u16,
    generation: u32,
}

impl ChannelId {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        // Slot tables never exceed MAX_CAPACITY, well inside u16.
        debug_assert!(index < crate::config::MAX_CAPACITY);
        Self {
            index: index as u16,
            generation,
        }
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.index)
    }

    pub(crate) fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}.{}", self.index, self.generation)
    }
}

/// Node role, fixed by the configured address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Slave,
}

impl Role {
    /// Address 0 is the master; anything else is a slave.
    pub fn for_address(address: u8) -> Self {
        if address == 0 {
            Role::Master
        } else {
            Role::Slave
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Master => "master",
            Role::Slave => "slave",
        })
    }
}

/// The state a channel is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPhase {
    /// Master: waiting for line silence before accepting requests.
    Starting,
    /// Master: ready for a request. Slave: waiting for the first byte.
    Idle,
    /// Frame handed to the transport, transmit-complete pending.
    Transmitting,
    /// Master: unicast request sent, waiting for the reply.
    AwaitingResponse,
    /// Master: broadcast sent, observing the fixed post-broadcast delay.
    Turnaround,
    /// Slave: collecting bytes until silence ends the frame.
    Receiving,
    /// Slave: request delivered to the handler, reply not yet sent.
    ProcessingRequest,
}

impl ChannelPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelPhase::Starting => "starting",
            ChannelPhase::Idle => "idle",
            ChannelPhase::Transmitting => "transmitting",
            ChannelPhase::AwaitingResponse => "awaiting_response",
            ChannelPhase::Turnaround => "turnaround",
            ChannelPhase::Receiving => "receiving",
            ChannelPhase::ProcessingRequest => "processing_request",
        }
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    /// Received frames dropped for checksum or length problems.
    pub framing_errors: u64,
    /// Master exchanges that ended without any reply, or slave requests
    /// whose deferred answer never came.
    pub timeouts: u64,
    /// Bytes dropped because the receive buffer was full.
    pub overflows: u64,
    /// Valid frames addressed to another node.
    pub foreign_frames: u64,
}

/// What a pending timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Silence,
    ResponseTimeout,
    Turnaround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ArmedTimer {
    pub(crate) handle: TimerHandle,
    pub(crate) kind: TimerKind,
}

/// Everything a state machine may touch while handling one event.
pub(crate) struct Link<'a> {
    pub(crate) id: ChannelId,
    pub(crate) transport: &'a mut dyn ByteStream,
    pub(crate) timers: &'a mut dyn TimerService,
    pub(crate) armed: &'a mut Option<ArmedTimer>,
    pub(crate) line: &'a LineConfig,
    pub(crate) rx: &'a mut BytesMut,
    pub(crate) stats: &'a mut ChannelStats,
    pub(crate) status: &'a mut Option<StatusSink>,
}

impl Link<'_> {
    /// Start the channel's single timer.
    ///
    /// A timer already pending here means a state handler skipped its
    /// `disarm`; the stale one is cancelled so the one-timer invariant holds.
    pub(crate) fn arm(&mut self, kind: TimerKind) {
        if let Some(stale) = self.armed.take() {
            error!(
                channel = %self.id,
                pending = ?stale.kind,
                requested = ?kind,
                "timer armed while another was pending"
            );
            self.timers.cancel(stale.handle);
        }
        let duration = match kind {
            TimerKind::Silence => self.line.silence(),
            TimerKind::ResponseTimeout => self.line.response_timeout,
            TimerKind::Turnaround => self.line.turnaround,
        };
        let handle = self.timers.start(duration);
        trace!(channel = %self.id, ?kind, ?duration, %handle, "timer armed");
        *self.armed = Some(ArmedTimer { handle, kind });
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(armed) = self.armed.take() {
            self.timers.cancel(armed.handle);
        }
    }

    /// Encode and hand a frame to the transport.
    pub(crate) fn transmit(&mut self, address: u8, pdu: &[u8]) -> Result<()> {
        let wire = self.line.frame.encode(address, pdu)?;
        self.transport.send(&wire)?;
        self.stats.frames_sent += 1;
        trace!(channel = %self.id, address, len = wire.len(), "frame transmitted");
        Ok(())
    }

    /// Append one received byte, dropping it if the buffer is full.
    pub(crate) fn buffer(&mut self, byte: u8) {
        if self.rx.len() >= RX_CAPACITY {
            self.stats.overflows += 1;
            warn!(channel = %self.id, capacity = RX_CAPACITY, "receive buffer full, byte dropped");
            return;
        }
        self.rx.put_u8(byte);
    }

    /// Decode the buffered bytes and empty the buffer.
    pub(crate) fn take_frame(&mut self) -> std::result::Result<Frame, FrameError> {
        let decoded = self.line.frame.decode(&self.rx[..]);
        self.rx.clear();
        decoded
    }

    pub(crate) fn notify(&mut self, activity: Activity) {
        if let Some(sink) = self.status.as_mut() {
            sink(self.id, activity);
        }
    }
}
