//! Master state machine.
//!
//! ```text
//!            silence                request              tx complete (unicast)
//! Starting ──────────▶ Idle ──────────────▶ Transmitting ─────────────────────▶ AwaitingResponse
//!    ▲                                          │                                   │
//!    │              turnaround expiry           │ tx complete (broadcast)           │ silence: reply decoded
//!    ├──────────────────── Turnaround ◀─────────┘                                   │ or response timeout
//!    └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//! Each state carries only its own data; the pending exchange lives inside
//! `Transmitting` and `AwaitingResponse` and nowhere else.

use rtuprims_frame::{validate_address, Frame, FrameError, BROADCAST, MAX_PDU};
use tracing::{debug, trace, warn};

use crate::channel::{ChannelId, ChannelPhase, Link, TimerKind};
use crate::config::Activity;
use crate::error::{EngineError, Result};

/// How a master exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// A checksum-valid reply from the addressed node.
    Response(Frame),
    /// The response timeout expired before any reply byte arrived.
    NoResponse,
}

impl ExchangeOutcome {
    /// The reply frame, if one arrived.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            ExchangeOutcome::Response(frame) => Some(frame),
            ExchangeOutcome::NoResponse => None,
        }
    }
}

/// Receives the outcome of one unicast request. Never called for broadcasts.
pub type ResponseCallback = Box<dyn FnOnce(ChannelId, ExchangeOutcome)>;

struct PendingExchange {
    destination: u8,
    callback: ResponseCallback,
}

enum MasterState {
    Starting,
    Idle,
    Transmitting(PendingExchange),
    AwaitingResponse(PendingExchange),
    Turnaround,
}

pub(crate) struct Master {
    state: MasterState,
}

impl Master {
    pub(crate) fn new() -> Self {
        Self {
            state: MasterState::Starting,
        }
    }

    pub(crate) fn phase(&self) -> ChannelPhase {
        match self.state {
            MasterState::Starting => ChannelPhase::Starting,
            MasterState::Idle => ChannelPhase::Idle,
            MasterState::Transmitting(_) => ChannelPhase::Transmitting,
            MasterState::AwaitingResponse(_) => ChannelPhase::AwaitingResponse,
            MasterState::Turnaround => ChannelPhase::Turnaround,
        }
    }

    /// Enter `Starting` right after reservation.
    pub(crate) fn start(&mut self, link: &mut Link<'_>) {
        self.state = MasterState::Starting;
        link.arm(TimerKind::Silence);
    }

    /// Accept a request. Only valid in `Idle`.
    pub(crate) fn request(
        &mut self,
        link: &mut Link<'_>,
        destination: u8,
        pdu: &[u8],
        callback: ResponseCallback,
    ) -> Result<()> {
        validate_address(destination)?;
        if pdu.is_empty() {
            return Err(FrameError::EmptyPdu.into());
        }
        if pdu.len() > MAX_PDU {
            return Err(FrameError::PduTooLarge {
                size: pdu.len(),
                max: MAX_PDU,
            }
            .into());
        }
        if !matches!(self.state, MasterState::Idle) {
            return Err(EngineError::Busy {
                channel: link.id,
                phase: self.phase(),
            });
        }

        link.transmit(destination, pdu)?;
        self.state = MasterState::Transmitting(PendingExchange {
            destination,
            callback,
        });
        debug!(
            channel = %link.id,
            destination,
            function = pdu[0],
            "request sent"
        );
        link.notify(Activity::Busy);
        Ok(())
    }

    pub(crate) fn on_byte(&mut self, link: &mut Link<'_>, byte: u8) {
        match self.state {
            MasterState::AwaitingResponse(_) => {
                link.disarm();
                link.buffer(byte);
                link.arm(TimerKind::Silence);
            }
            MasterState::Starting => {
                // Traffic on the line restarts the quiet period.
                link.disarm();
                link.arm(TimerKind::Silence);
                trace!(channel = %link.id, byte, "byte during startup discarded");
            }
            MasterState::Idle | MasterState::Transmitting(_) | MasterState::Turnaround => {
                trace!(channel = %link.id, byte, phase = %self.phase(), "unsolicited byte discarded");
            }
        }
    }

    pub(crate) fn on_tx_complete(&mut self, link: &mut Link<'_>) {
        let state = std::mem::replace(&mut self.state, MasterState::Starting);
        self.state = match state {
            MasterState::Transmitting(pending) if pending.destination == BROADCAST => {
                link.arm(TimerKind::Turnaround);
                MasterState::Turnaround
            }
            MasterState::Transmitting(pending) => {
                link.rx.clear();
                link.arm(TimerKind::ResponseTimeout);
                MasterState::AwaitingResponse(pending)
            }
            other => {
                trace!(channel = %link.id, "transmit-complete outside transmitting ignored");
                other
            }
        };
    }

    /// Handle expiry of the channel's timer. The registry has already
    /// cleared the armed slot.
    pub(crate) fn on_timer(&mut self, link: &mut Link<'_>, kind: TimerKind) {
        let state = std::mem::replace(&mut self.state, MasterState::Starting);
        match (state, kind) {
            (MasterState::Starting, TimerKind::Silence) => {
                self.state = MasterState::Idle;
                trace!(channel = %link.id, "line quiet, master idle");
                link.notify(Activity::Ready);
            }
            (MasterState::AwaitingResponse(pending), TimerKind::Silence) => {
                let decoded = link.take_frame();
                self.restart(link);
                match decoded {
                    Ok(frame) if frame.address == pending.destination => {
                        link.stats.frames_received += 1;
                        debug!(
                            channel = %link.id,
                            address = frame.address,
                            function = frame.function(),
                            len = frame.pdu.len(),
                            "response received"
                        );
                        (pending.callback)(link.id, ExchangeOutcome::Response(frame));
                    }
                    Ok(frame) => {
                        link.stats.foreign_frames += 1;
                        warn!(
                            channel = %link.id,
                            expected = pending.destination,
                            address = frame.address,
                            "response from unexpected node dropped"
                        );
                    }
                    Err(err) => {
                        link.stats.framing_errors += 1;
                        warn!(channel = %link.id, error = %err, "invalid response dropped");
                    }
                }
            }
            (MasterState::AwaitingResponse(pending), TimerKind::ResponseTimeout) => {
                link.rx.clear();
                link.stats.timeouts += 1;
                self.restart(link);
                debug!(
                    channel = %link.id,
                    destination = pending.destination,
                    "no response before timeout"
                );
                (pending.callback)(link.id, ExchangeOutcome::NoResponse);
            }
            (MasterState::Turnaround, TimerKind::Turnaround) => {
                self.restart(link);
            }
            (state, kind) => {
                self.state = state;
                trace!(channel = %link.id, ?kind, phase = %self.phase(), "timer expiry ignored");
            }
        }
    }

    /// Return to `Starting` and wait for silence again.
    fn restart(&mut self, link: &mut Link<'_>) {
        self.state = MasterState::Starting;
        link.arm(TimerKind::Silence);
    }
}
