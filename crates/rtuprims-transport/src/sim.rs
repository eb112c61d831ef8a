//! In-memory shared bus for deterministic multi-node runs.
//!
//! Every byte sent by one attached port reaches every other attached port,
//! the way a two-wire RS-485 segment behaves. Transmissions are queued by
//! [`SimPort::send`] and only turned into [`StreamEvent`]s when the owner
//! calls [`SimBus::drain`], so delivery never happens inside `send`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ByteStream, StreamEvent, TransportId};

#[derive(Debug, Default)]
struct BusState {
    next_id: u32,
    attached: Vec<TransportId>,
    queued: VecDeque<Transmission>,
    transcript: Vec<Transmission>,
}

#[derive(Debug, Clone)]
enum Origin {
    Port(TransportId),
    Noise,
}

#[derive(Debug, Clone)]
struct Transmission {
    origin: Origin,
    bytes: Bytes,
}

/// One entry of the bus transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traffic {
    /// Sending port, or `None` for injected noise.
    pub from: Option<TransportId>,
    pub bytes: Bytes,
}

/// Shared simulated medium. Cloning yields another handle to the same bus.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    state: Rc<RefCell<BusState>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new port to the bus.
    pub fn attach(&self) -> SimPort {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = TransportId::new(state.next_id);
        state.attached.push(id);
        debug!(transport = %id, "port attached to simulated bus");
        SimPort {
            id,
            bus: self.clone(),
        }
    }

    /// Put raw bytes on the wire without a sender (line noise).
    ///
    /// Noise reaches every attached port and produces no transmit-complete.
    pub fn inject(&self, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let transmission = Transmission {
            origin: Origin::Noise,
            bytes: Bytes::copy_from_slice(bytes),
        };
        state.queued.push_back(transmission);
    }

    /// Whether any transmission is waiting to be delivered.
    pub fn has_pending(&self) -> bool {
        !self.state.borrow().queued.is_empty()
    }

    /// Deliver every queued transmission in send order.
    ///
    /// For each transmission, each byte is delivered to every other attached
    /// port; the sender then receives its transmit-complete.
    pub fn drain(&self) -> Vec<StreamEvent> {
        let mut state = self.state.borrow_mut();
        let mut events = Vec::new();
        while let Some(transmission) = state.queued.pop_front() {
            let sender = match transmission.origin {
                Origin::Port(id) => Some(id),
                Origin::Noise => None,
            };
            for &byte in transmission.bytes.iter() {
                for &receiver in state.attached.iter().filter(|id| Some(**id) != sender) {
                    events.push(StreamEvent::Byte {
                        transport: receiver,
                        byte,
                    });
                }
            }
            if let Some(sender) = sender {
                if state.attached.contains(&sender) {
                    events.push(StreamEvent::TxComplete { transport: sender });
                }
            }
            trace!(len = transmission.bytes.len(), "transmission delivered");
            state.transcript.push(transmission);
        }
        events
    }

    /// Everything delivered so far, in order.
    pub fn transcript(&self) -> Vec<Traffic> {
        self.state
            .borrow()
            .transcript
            .iter()
            .map(|t| Traffic {
                from: match t.origin {
                    Origin::Port(id) => Some(id),
                    Origin::Noise => None,
                },
                bytes: t.bytes.clone(),
            })
            .collect()
    }

    fn enqueue(&self, from: TransportId, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.attached.contains(&from) {
            return Err(TransportError::Detached(from));
        }
        state.queued.push_back(Transmission {
            origin: Origin::Port(from),
            bytes: Bytes::copy_from_slice(bytes),
        });
        Ok(())
    }

    fn detach(&self, id: TransportId) {
        let mut state = self.state.borrow_mut();
        state.attached.retain(|existing| *existing != id);
        debug!(transport = %id, "port detached from simulated bus");
    }
}

/// A port on a [`SimBus`]. Dropping the port detaches it.
#[derive(Debug)]
pub struct SimPort {
    id: TransportId,
    bus: SimBus,
}

impl ByteStream for SimPort {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.bus.enqueue(self.id, bytes)
    }
}

impl Drop for SimPort {
    fn drop(&mut self) {
        self.bus.detach(self.id);
    }
}
