use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rtuprims_engine::{
    Activity, ChannelId, ChannelPhase, Engine, EngineConfig, EngineError, LineConfig, Role, RoleConfig,
    Simulation, MAX_CAPACITY,
};
use rtuprims_transport::{
    ByteStream, Result as TransportResult, TimerHandle, TransportId, VirtualTimers,
};

/// Transport with a caller-chosen identity that accepts and discards bytes.
struct Fixed(TransportId);

impl ByteStream for Fixed {
    fn id(&self) -> TransportId {
        self.0
    }

    fn send(&mut self, _bytes: &[u8]) -> TransportResult<()> {
        Ok(())
    }
}

#[test]
fn fourth_reservation_exceeds_capacity_of_three() {
    let mut sim = Simulation::new(EngineConfig { capacity: 3 });
    let ports = [sim.port(), sim.port(), sim.port(), sim.port()];
    let [a, b, c, d] = ports;

    let master = sim.engine_mut().reserve(RoleConfig::master(a)).unwrap();
    let first = sim.engine_mut().reserve(RoleConfig::new(1, b)).unwrap();
    let second = sim.engine_mut().reserve(RoleConfig::new(2, c)).unwrap();
    let before: Vec<_> = [master, first, second]
        .iter()
        .map(|id| sim.engine().phase(*id).unwrap())
        .collect();

    let err = sim.engine_mut().reserve(RoleConfig::new(3, d)).unwrap_err();
    assert!(matches!(err, EngineError::NoResources { capacity: 3 }));

    let after: Vec<_> = [master, first, second]
        .iter()
        .map(|id| sim.engine().phase(*id).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(sim.engine().active(), 3);
    assert_eq!(sim.engine().capacity(), 3);
}

#[test]
fn role_follows_configured_address() {
    let mut sim = Simulation::default();
    let (a, b) = (sim.port(), sim.port());
    let master = sim.engine_mut().reserve(RoleConfig::master(a)).unwrap();
    let slave = sim.engine_mut().reserve(RoleConfig::new(0x30, b)).unwrap();

    assert_eq!(sim.engine().role(master).unwrap(), Role::Master);
    assert_eq!(sim.engine().phase(master).unwrap(), ChannelPhase::Starting);
    assert_eq!(sim.engine().role(slave).unwrap(), Role::Slave);
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(sim.engine().address(slave).unwrap(), 0x30);
}

#[test]
fn invalid_configuration_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default(), VirtualTimers::new());

    let err = engine
        .reserve(RoleConfig::new(248, Fixed(TransportId::new(1))))
        .unwrap_err();
    assert!(matches!(err, EngineError::BadInput(_)));

    let line = LineConfig {
        baud: 0,
        ..LineConfig::default()
    };
    let err = engine
        .reserve(RoleConfig::master(Fixed(TransportId::new(1))).with_line(line))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidLine(_)));
    assert_eq!(engine.active(), 0);
}

#[test]
fn oversized_capacity_is_clamped() {
    let mut engine = Engine::new(
        EngineConfig {
            capacity: 70_000,
        },
        VirtualTimers::new(),
    );
    assert_eq!(engine.capacity(), MAX_CAPACITY);

    let ids: Vec<ChannelId> = (0..MAX_CAPACITY as u32)
        .map(|n| {
            engine
                .reserve(RoleConfig::new(1, Fixed(TransportId::new(n + 1))))
                .unwrap()
        })
        .collect();
    let err = engine
        .reserve(RoleConfig::new(1, Fixed(TransportId::new(0))))
        .unwrap_err();
    assert!(matches!(err, EngineError::NoResources { .. }));

    // every slot got its own handle
    let unique: HashSet<ChannelId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), MAX_CAPACITY);
    assert_eq!(engine.address(ids[MAX_CAPACITY - 1]).unwrap(), 1);
}

#[test]
fn transport_binds_to_one_channel_only() {
    let mut engine = Engine::new(EngineConfig::default(), VirtualTimers::new());
    engine
        .reserve(RoleConfig::new(1, Fixed(TransportId::new(9))))
        .unwrap();
    let err = engine
        .reserve(RoleConfig::new(2, Fixed(TransportId::new(9))))
        .unwrap_err();
    assert!(matches!(err, EngineError::TransportInUse(id) if id == TransportId::new(9)));
}

#[test]
fn released_handle_never_aliases_new_reservation() {
    let mut engine = Engine::new(EngineConfig { capacity: 1 }, VirtualTimers::new());
    let old = engine
        .reserve(RoleConfig::new(1, Fixed(TransportId::new(1))))
        .unwrap();
    let released = engine.release(old).unwrap();
    assert_eq!(released.transport.id(), TransportId::new(1));

    let new = engine.reserve(RoleConfig::new(2, released.transport)).unwrap();
    assert_ne!(old, new);
    assert!(matches!(engine.phase(old), Err(EngineError::UnknownChannel(_))));
    assert!(matches!(engine.release(old), Err(EngineError::UnknownChannel(_))));
    assert_eq!(engine.address(new).unwrap(), 2);
}

#[test]
fn release_cancels_the_armed_timer() {
    let mut sim = Simulation::default();
    let port = sim.port();
    let master = sim.engine_mut().reserve(RoleConfig::master(port)).unwrap();
    assert_eq!(sim.engine().timers().pending(), 1);

    sim.engine_mut().release(master).unwrap();
    assert_eq!(sim.engine().timers().pending(), 0);
    assert_eq!(sim.run_until_quiet(), 0);
}

#[test]
fn released_master_drops_pending_exchange() {
    let mut sim = Simulation::default();
    let port = sim.port();
    let master = sim.engine_mut().reserve(RoleConfig::master(port)).unwrap();
    sim.run_until_quiet();

    let called = Rc::new(RefCell::new(false));
    let flag = called.clone();
    sim.engine_mut()
        .request(master, 4, &[0x03, 0x00, 0x00, 0x00, 0x01], move |_, _| {
            *flag.borrow_mut() = true
        })
        .unwrap();
    sim.step();
    sim.engine_mut().release(master).unwrap();
    sim.run_until_quiet();

    assert!(!*called.borrow());
}

#[test]
fn operations_are_checked_against_role() {
    let mut sim = Simulation::default();
    let (a, b) = (sim.port(), sim.port());
    let master = sim.engine_mut().reserve(RoleConfig::master(a)).unwrap();
    let slave = sim.engine_mut().reserve(RoleConfig::new(5, b)).unwrap();
    sim.run_until_quiet();

    let err = sim
        .engine_mut()
        .request(slave, 1, &[0x03, 0x00], |_, _| {})
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::RoleViolation {
            operation: "request",
            role: Role::Slave
        }
    ));
    assert!(matches!(
        sim.engine_mut().respond(master, &[0x03, 0x00]),
        Err(EngineError::RoleViolation { role: Role::Master, .. })
    ));
    assert!(matches!(
        sim.engine_mut().decline(master),
        Err(EngineError::RoleViolation { .. })
    ));
}

#[test]
fn events_for_unbound_transport_are_dropped() {
    let mut engine = Engine::new(EngineConfig::default(), VirtualTimers::new());
    engine
        .reserve(RoleConfig::new(1, Fixed(TransportId::new(1))))
        .unwrap();

    assert!(!engine.route_byte(TransportId::new(2), 0x01));
    assert!(!engine.route_tx_complete(TransportId::new(2)));
    assert!(engine.route_byte(TransportId::new(1), 0x01));
    assert!(!engine.on_timer(TimerHandle::new(4242)));
}

#[test]
fn status_sink_tracks_ready_and_busy() {
    let mut sim = Simulation::default();
    let events = Rc::new(RefCell::new(Vec::new()));
    let (a, b) = (sim.port(), sim.port());

    let log = events.clone();
    let slave = sim
        .engine_mut()
        .reserve(
            RoleConfig::slave(0x11, a, |_, responder| {
                responder.respond(&[0x03, 0x02, 0x00, 0x00]).unwrap();
            })
            .with_status(move |id, activity| log.borrow_mut().push((id, activity))),
        )
        .unwrap();
    let log = events.clone();
    let master = sim
        .engine_mut()
        .reserve(
            RoleConfig::master(b)
                .with_status(move |id, activity| log.borrow_mut().push((id, activity))),
        )
        .unwrap();
    sim.run_until_quiet();

    sim.engine_mut()
        .request(master, 0x11, &[0x03, 0x00, 0x00, 0x00, 0x01], |_, _| {})
        .unwrap();
    sim.run_until_quiet();

    let of = |channel: ChannelId| -> Vec<Activity> {
        events
            .borrow()
            .iter()
            .filter(|(id, _)| *id == channel)
            .map(|(_, activity)| *activity)
            .collect()
    };
    use Activity::{Busy, Ready};
    assert_eq!(of(slave), vec![Ready, Busy, Ready]);
    assert_eq!(of(master), vec![Ready, Busy, Ready]);
}

#[test]
fn tx_complete_hook_is_chained_and_returned() {
    let mut sim = Simulation::default();
    let completions = Rc::new(RefCell::new(Vec::new()));
    let log = completions.clone();
    let port = sim.port();
    let transport = port.id();
    let master = sim
        .engine_mut()
        .reserve(RoleConfig::master(port).with_tx_complete_hook(move |id| log.borrow_mut().push(id)))
        .unwrap();
    sim.run_until_quiet();

    sim.engine_mut()
        .request(master, 0, &[0x05, 0x00, 0x01, 0xFF, 0x00], |_, _| {})
        .unwrap();
    sim.step();
    assert_eq!(*completions.borrow(), vec![transport]);
    assert_eq!(sim.engine().phase(master).unwrap(), ChannelPhase::Turnaround);

    let released = sim.engine_mut().release(master).unwrap();
    assert!(released.tx_complete_hook.is_some());
    assert_eq!(released.stats.frames_sent, 1);
}
