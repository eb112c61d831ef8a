use bytes::BytesMut;
use rtuprims_frame::{validate_address, ExceptionCode};
use rtuprims_transport::{ByteStream, StreamEvent, TimerHandle, TimerService, TransportId};
use tracing::{debug, info, warn};

use crate::channel::{
    ArmedTimer, ChannelId, ChannelPhase, ChannelStats, Link, Role, RX_CAPACITY,
};
use crate::config::{
    EngineConfig, LineConfig, RoleConfig, StatusSink, TxCompleteHook, MAX_CAPACITY,
};
use crate::error::{EngineError, Result};
use crate::master::{ExchangeOutcome, Master};
use crate::slave::Slave;

enum Machine {
    Master(Master),
    Slave(Slave),
}

struct Channel {
    id: ChannelId,
    address: u8,
    transport: Box<dyn ByteStream>,
    transport_id: TransportId,
    line: LineConfig,
    armed: Option<ArmedTimer>,
    rx: BytesMut,
    stats: ChannelStats,
    status: Option<StatusSink>,
    tx_complete_hook: Option<TxCompleteHook>,
    machine: Machine,
}

impl Channel {
    /// Split the channel into its state machine and an I/O context.
    fn split<'a>(&'a mut self, timers: &'a mut dyn TimerService) -> (&'a mut Machine, Link<'a>) {
        let link = Link {
            id: self.id,
            transport: self.transport.as_mut(),
            timers,
            armed: &mut self.armed,
            line: &self.line,
            rx: &mut self.rx,
            stats: &mut self.stats,
            status: &mut self.status,
        };
        (&mut self.machine, link)
    }

    fn role(&self) -> Role {
        match self.machine {
            Machine::Master(_) => Role::Master,
            Machine::Slave(_) => Role::Slave,
        }
    }

    fn phase(&self) -> ChannelPhase {
        match &self.machine {
            Machine::Master(master) => master.phase(),
            Machine::Slave(slave) => slave.phase(),
        }
    }
}

struct Slot {
    generation: u32,
    channel: Option<Channel>,
}

/// What `release` hands back to the caller.
pub struct Released {
    /// The unbound transport.
    pub transport: Box<dyn ByteStream>,
    /// The caller's own transmit-complete hook, if one was chained.
    pub tx_complete_hook: Option<TxCompleteHook>,
    /// Final counters of the released channel.
    pub stats: ChannelStats,
}

impl std::fmt::Debug for Released {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Released")
            .field("transport", &self.transport.id())
            .field("tx_complete_hook", &self.tx_complete_hook.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Fixed-capacity channel table and event router.
///
/// The engine owns the timer service so it can cancel timers synchronously
/// on release. The driver that owns the engine collects expired handles
/// from [`Engine::timers_mut`] and feeds them to [`Engine::on_timer`].
pub struct Engine<T> {
    slots: Vec<Slot>,
    timers: T,
}

impl<T: TimerService> Engine<T> {
    /// Build the slot table. A capacity above [`MAX_CAPACITY`] is clamped;
    /// call [`EngineConfig::validate`] first to reject it instead.
    pub fn new(config: EngineConfig, timers: T) -> Self {
        if config.validate().is_err() {
            warn!(
                requested = config.capacity,
                max = MAX_CAPACITY,
                "channel capacity clamped"
            );
        }
        let slots = (0..config.capacity.min(MAX_CAPACITY))
            .map(|_| Slot {
                generation: 0,
                channel: None,
            })
            .collect();
        Self { slots, timers }
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }

    pub fn timers_mut(&mut self) -> &mut T {
        &mut self.timers
    }

    /// Number of channel slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of reserved channels.
    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.channel.is_some()).count()
    }

    /// Reserve a channel and bind its transport.
    ///
    /// The role follows the address: 0 starts a master in `Starting`, any
    /// other valid address a slave in `Idle`.
    pub fn reserve(&mut self, config: RoleConfig) -> Result<ChannelId> {
        validate_address(config.address)?;
        config.line.validate()?;

        let transport_id = config.transport.id();
        if self.find_by_transport(transport_id).is_some() {
            return Err(EngineError::TransportInUse(transport_id));
        }

        let capacity = self.slots.len();
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.channel.is_none())
            .ok_or(EngineError::NoResources { capacity })?;

        let id = ChannelId::new(index, slot.generation);
        let role = config.role();
        let machine = match role {
            Role::Master => Machine::Master(Master::new()),
            Role::Slave => Machine::Slave(Slave::new(config.address, config.handler)),
        };
        let channel = slot.channel.insert(Channel {
            id,
            address: config.address,
            transport: config.transport,
            transport_id,
            line: config.line,
            armed: None,
            rx: BytesMut::with_capacity(RX_CAPACITY),
            stats: ChannelStats::default(),
            status: config.status,
            tx_complete_hook: config.tx_complete_hook,
            machine,
        });

        info!(
            channel = %id,
            %role,
            address = config.address,
            transport = %transport_id,
            baud = channel.line.baud,
            "channel reserved"
        );

        let (machine, mut link) = channel.split(&mut self.timers);
        match machine {
            Machine::Master(master) => master.start(&mut link),
            Machine::Slave(slave) => slave.start(&mut link),
        }
        Ok(id)
    }

    /// Cancel the channel's timer, unbind its transport and free the slot.
    ///
    /// A master exchange still in flight is dropped without a callback.
    pub fn release(&mut self, id: ChannelId) -> Result<Released> {
        let slot = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation() && slot.channel.is_some())
            .ok_or(EngineError::UnknownChannel(id))?;
        let mut channel = slot.channel.take().ok_or(EngineError::UnknownChannel(id))?;
        slot.generation = slot.generation.wrapping_add(1);

        if let Some(armed) = channel.armed.take() {
            self.timers.cancel(armed.handle);
        }
        info!(
            channel = %id,
            phase = %channel.phase(),
            transport = %channel.transport_id,
            "channel released"
        );

        Ok(Released {
            transport: channel.transport,
            tx_complete_hook: channel.tx_complete_hook,
            stats: channel.stats,
        })
    }

    /// Issue a master request.
    ///
    /// `callback` runs at most once: with the reply, or with
    /// [`ExchangeOutcome::NoResponse`] when the response timeout expires. A
    /// reply that fails to decode, or that comes from the wrong node, ends
    /// the exchange without a callback. Broadcasts never call it.
    pub fn request<F>(&mut self, id: ChannelId, destination: u8, pdu: &[u8], callback: F) -> Result<()>
    where
        F: FnOnce(ChannelId, ExchangeOutcome) + 'static,
    {
        let (channel, timers) = self.channel_mut(id)?;
        let (machine, mut link) = channel.split(timers);
        match machine {
            Machine::Master(master) => master.request(&mut link, destination, pdu, Box::new(callback)),
            Machine::Slave(_) => Err(EngineError::RoleViolation {
                operation: "request",
                role: Role::Slave,
            }),
        }
    }

    /// Answer the open request on a slave channel.
    pub fn respond(&mut self, id: ChannelId, pdu: &[u8]) -> Result<()> {
        self.with_slave(id, "respond", |slave, link| slave.respond(link, pdu))
    }

    /// Answer the open request with an exception reply.
    pub fn respond_error(&mut self, id: ChannelId, function: u8, code: ExceptionCode) -> Result<()> {
        self.respond(id, &code.reply_pdu(function))
    }

    /// Close the open request on a slave channel without answering.
    pub fn decline(&mut self, id: ChannelId) -> Result<()> {
        self.with_slave(id, "decline", |slave, link| slave.decline(link))
    }

    pub fn phase(&self, id: ChannelId) -> Result<ChannelPhase> {
        self.channel(id).map(Channel::phase)
    }

    pub fn role(&self, id: ChannelId) -> Result<Role> {
        self.channel(id).map(Channel::role)
    }

    pub fn address(&self, id: ChannelId) -> Result<u8> {
        self.channel(id).map(|channel| channel.address)
    }

    pub fn stats(&self, id: ChannelId) -> Result<ChannelStats> {
        self.channel(id).map(|channel| channel.stats)
    }

    /// Route one transport notification.
    pub fn dispatch(&mut self, event: StreamEvent) -> bool {
        match event {
            StreamEvent::Byte { transport, byte } => self.route_byte(transport, byte),
            StreamEvent::TxComplete { transport } => self.route_tx_complete(transport),
        }
    }

    /// Deliver a received byte to the channel bound to `transport`.
    ///
    /// Returns false, after logging, when no channel is bound to it.
    pub fn route_byte(&mut self, transport: TransportId, byte: u8) -> bool {
        let Some(index) = self.find_by_transport(transport) else {
            warn!(%transport, "byte for unbound transport dropped");
            return false;
        };
        let Some(channel) = self.slots[index].channel.as_mut() else {
            return false;
        };
        let (machine, mut link) = channel.split(&mut self.timers);
        match machine {
            Machine::Master(master) => master.on_byte(&mut link, byte),
            Machine::Slave(slave) => slave.on_byte(&mut link, byte),
        }
        true
    }

    /// Deliver transmit-complete to the channel bound to `transport`, then
    /// to the caller's chained hook.
    pub fn route_tx_complete(&mut self, transport: TransportId) -> bool {
        let Some(index) = self.find_by_transport(transport) else {
            warn!(%transport, "transmit-complete for unbound transport dropped");
            return false;
        };
        let Some(channel) = self.slots[index].channel.as_mut() else {
            return false;
        };
        let (machine, mut link) = channel.split(&mut self.timers);
        match machine {
            Machine::Master(master) => master.on_tx_complete(&mut link),
            Machine::Slave(slave) => slave.on_tx_complete(&mut link),
        }
        if let Some(hook) = channel.tx_complete_hook.as_mut() {
            hook(transport);
        }
        true
    }

    /// Apply a timer expiry.
    ///
    /// Only the handle currently armed on a live channel has any effect;
    /// cancelled, replaced and released handles match nothing.
    pub fn on_timer(&mut self, handle: TimerHandle) -> bool {
        let Some(channel) = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.channel.as_mut())
            .find(|channel| channel.armed.is_some_and(|armed| armed.handle == handle))
        else {
            debug!(%handle, "expiry for unknown timer ignored");
            return false;
        };
        let Some(armed) = channel.armed.take() else {
            return false;
        };

        let (machine, mut link) = channel.split(&mut self.timers);
        match machine {
            Machine::Master(master) => master.on_timer(&mut link, armed.kind),
            Machine::Slave(slave) => slave.on_timer(&mut link, armed.kind),
        }
        true
    }

    fn find_by_transport(&self, transport: TransportId) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.channel
                .as_ref()
                .is_some_and(|channel| channel.transport_id == transport)
        })
    }

    fn channel(&self, id: ChannelId) -> Result<&Channel> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.channel.as_ref())
            .ok_or(EngineError::UnknownChannel(id))
    }

    fn channel_mut(&mut self, id: ChannelId) -> Result<(&mut Channel, &mut T)> {
        let channel = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.channel.as_mut())
            .ok_or(EngineError::UnknownChannel(id))?;
        Ok((channel, &mut self.timers))
    }

    fn with_slave<R>(
        &mut self,
        id: ChannelId,
        operation: &'static str,
        f: impl FnOnce(&mut Slave, &mut Link<'_>) -> Result<R>,
    ) -> Result<R> {
        let (channel, timers) = self.channel_mut(id)?;
        let (machine, mut link) = channel.split(timers);
        match machine {
            Machine::Slave(slave) => f(slave, &mut link),
            Machine::Master(_) => Err(EngineError::RoleViolation {
                operation,
                role: Role::Master,
            }),
        }
    }
}

impl<T> std::fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels: Vec<String> = self
            .slots
            .iter()
            .filter_map(|slot| slot.channel.as_ref())
            .map(|channel| format!("{} {} {}", channel.id, channel.role(), channel.phase()))
            .collect();
        f.debug_struct("Engine")
            .field("capacity", &self.slots.len())
            .field("channels", &channels)
            .finish()
    }
}
