//! Slave state machine.
//!
//! ```text
//!        first byte            silence: frame decoded         respond
//! Idle ─────────────▶ Receiving ──────────────────▶ ProcessingRequest ─────────▶ Transmitting
//!  ▲                      │                               │                          │
//!  │  undecodable, no     │   declined, or deferral       │                          │
//!  │  handler, foreign    │   window expired              │                          │
//!  ├──────────────────────┘◀──────────────────────────────┘                          │
//!  └──────────────────────────────── tx complete ◀───────────────────────────────────┘
//! ```

use rtuprims_frame::{ExceptionCode, Frame};
use tracing::{debug, trace};

use crate::channel::{ChannelId, ChannelPhase, Link, TimerKind};
use crate::config::Activity;
use crate::error::{EngineError, Result};

/// Handles one decoded request addressed to this node.
///
/// The handler runs while the channel is in `ProcessingRequest` and may
/// answer synchronously through the [`Responder`]. Returning without an
/// answer leaves the request open for [`crate::Engine::respond`] or
/// [`crate::Engine::decline`] for one response timeout; after that the
/// channel drops the request and listens again.
pub type RequestHandler = Box<dyn for<'r, 'l> FnMut(&Frame, &mut Responder<'r, 'l>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Idle,
    Receiving,
    ProcessingRequest,
    Transmitting,
}

pub(crate) struct Slave {
    address: u8,
    state: SlaveState,
    handler: Option<RequestHandler>,
}

impl Slave {
    pub(crate) fn new(address: u8, handler: Option<RequestHandler>) -> Self {
        Self {
            address,
            state: SlaveState::Idle,
            handler,
        }
    }

    pub(crate) fn phase(&self) -> ChannelPhase {
        phase_of(self.state)
    }

    /// A slave starts out idle and ready.
    pub(crate) fn start(&mut self, link: &mut Link<'_>) {
        self.state = SlaveState::Idle;
        link.notify(Activity::Ready);
    }

    pub(crate) fn on_byte(&mut self, link: &mut Link<'_>, byte: u8) {
        match self.state {
            SlaveState::Idle => {
                self.state = SlaveState::Receiving;
                link.rx.clear();
                link.buffer(byte);
                link.arm(TimerKind::Silence);
                link.notify(Activity::Busy);
            }
            SlaveState::Receiving => {
                link.disarm();
                link.buffer(byte);
                link.arm(TimerKind::Silence);
            }
            SlaveState::ProcessingRequest | SlaveState::Transmitting => {
                trace!(channel = %link.id, byte, phase = %self.phase(), "byte discarded");
            }
        }
    }

    pub(crate) fn on_tx_complete(&mut self, link: &mut Link<'_>) {
        if self.state == SlaveState::Transmitting {
            self.become_idle(link);
        } else {
            trace!(channel = %link.id, "transmit-complete outside transmitting ignored");
        }
    }

    pub(crate) fn on_timer(&mut self, link: &mut Link<'_>, kind: TimerKind) {
        match (self.state, kind) {
            (SlaveState::Receiving, TimerKind::Silence) => self.on_frame_end(link),
            (SlaveState::ProcessingRequest, TimerKind::ResponseTimeout) => {
                link.stats.timeouts += 1;
                debug!(channel = %link.id, "deferred request never answered, dropped");
                self.become_idle(link);
            }
            _ => trace!(channel = %link.id, ?kind, phase = %self.phase(), "timer expiry ignored"),
        }
    }

    fn on_frame_end(&mut self, link: &mut Link<'_>) {
        let frame = match link.take_frame() {
            Ok(frame) => frame,
            Err(err) => {
                link.stats.framing_errors += 1;
                debug!(channel = %link.id, error = %err, "undecodable request discarded");
                self.become_idle(link);
                return;
            }
        };
        // Broadcasts never match a slave address, so they end here too.
        if frame.address != self.address {
            link.stats.foreign_frames += 1;
            trace!(
                channel = %link.id,
                address = frame.address,
                own = self.address,
                "frame for another node discarded"
            );
            self.become_idle(link);
            return;
        }
        let Some(mut handler) = self.handler.take() else {
            debug!(channel = %link.id, "no request handler configured, frame discarded");
            self.become_idle(link);
            return;
        };

        self.state = SlaveState::ProcessingRequest;

        link.stats.frames_received += 1;
        debug!(
            channel = %link.id,
            address = frame.address,
            function = frame.function(),
            len = frame.pdu.len(),
            "request received"
        );

        let mut responder = Responder {
            address: self.address,
            state: &mut self.state,
            link: &mut *link,
        };
        handler(&frame, &mut responder);
        self.handler = Some(handler);

        if self.state == SlaveState::ProcessingRequest {
            trace!(channel = %link.id, "handler returned without answering, reply deferred");
            link.arm(TimerKind::ResponseTimeout);
        }
    }

    pub(crate) fn respond(&mut self, link: &mut Link<'_>, pdu: &[u8]) -> Result<()> {
        respond_in(&mut self.state, self.address, link, pdu)
    }

    /// Close an open request without answering it.
    pub(crate) fn decline(&mut self, link: &mut Link<'_>) -> Result<()> {
        if self.state != SlaveState::ProcessingRequest {
            return Err(EngineError::Busy {
                channel: link.id,
                phase: self.phase(),
            });
        }
        debug!(channel = %link.id, "request declined");
        link.disarm();
        self.become_idle(link);
        Ok(())
    }

    fn become_idle(&mut self, link: &mut Link<'_>) {
        self.state = SlaveState::Idle;
        link.notify(Activity::Ready);
    }
}

fn phase_of(state: SlaveState) -> ChannelPhase {
    match state {
        SlaveState::Idle => ChannelPhase::Idle,
        SlaveState::Receiving => ChannelPhase::Receiving,
        SlaveState::ProcessingRequest => ChannelPhase::ProcessingRequest,
        SlaveState::Transmitting => ChannelPhase::Transmitting,
    }
}

fn respond_in(state: &mut SlaveState, address: u8, link: &mut Link<'_>, pdu: &[u8]) -> Result<()> {
    if *state != SlaveState::ProcessingRequest {
        return Err(EngineError::Busy {
            channel: link.id,
            phase: phase_of(*state),
        });
    }
    link.transmit(address, pdu)?;
    link.disarm();
    *state = SlaveState::Transmitting;
    debug!(channel = %link.id, function = pdu[0], len = pdu.len(), "response sent");
    Ok(())
}

/// Answers the request currently being handled.
///
/// At most one answer is accepted per request; later calls fail with
/// [`EngineError::Busy`].
pub struct Responder<'r, 'l> {
    address: u8,
    state: &'r mut SlaveState,
    link: &'r mut Link<'l>,
}

impl Responder<'_, '_> {
    pub fn channel(&self) -> ChannelId {
        self.link.id
    }

    /// This node's own address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Whether an answer has already been sent for this request.
    pub fn has_responded(&self) -> bool {
        *self.state == SlaveState::Transmitting
    }

    /// Send a data reply (function code followed by data).
    pub fn respond(&mut self, pdu: &[u8]) -> Result<()> {
        respond_in(self.state, self.address, self.link, pdu)
    }

    /// Send an exception reply for `function`.
    pub fn respond_error(&mut self, function: u8, code: ExceptionCode) -> Result<()> {
        self.respond(&code.reply_pdu(function))
    }
}
