use std::cell::RefCell;
use std::rc::Rc;

use rtuprims_engine::{
    ChannelId, ChannelPhase, EngineError, ExceptionCode, ExchangeOutcome, Frame, FrameConfig,
    RoleConfig, Simulation,
};
use rtuprims_transport::{ByteStream, Result as TransportResult, TransportError, TransportId};

const READ: [u8; 5] = [0x03, 0x00, 0x00, 0x00, 0x01];

/// One idle master plus the settled simulation.
fn with_master(sim: &mut Simulation) -> ChannelId {
    let port = sim.port();
    let id = sim
        .engine_mut()
        .reserve(RoleConfig::master(port))
        .expect("master should reserve");
    sim.run_until_quiet();
    id
}

type Slot = Rc<RefCell<Option<ExchangeOutcome>>>;

fn record_outcome(slot: Slot) -> impl FnOnce(ChannelId, ExchangeOutcome) + 'static {
    move |_, outcome| *slot.borrow_mut() = Some(outcome)
}

#[test]
fn request_for_another_address_returns_slave_to_idle() {
    let mut sim = Simulation::default();
    let calls = Rc::new(RefCell::new(0u32));
    let seen = calls.clone();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x05, port, move |_, _| *seen.borrow_mut() += 1))
        .unwrap();
    let master = with_master(&mut sim);

    let outcome: Slot = Rc::default();
    sim.engine_mut()
        .request(master, 0x06, &READ, record_outcome(outcome.clone()))
        .unwrap();
    sim.run_until_quiet();

    assert_eq!(*calls.borrow(), 0);
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(sim.engine().stats(slave).unwrap().foreign_frames, 1);
    assert_eq!(*outcome.borrow(), Some(ExchangeOutcome::NoResponse));
}

#[test]
fn exception_reply_reaches_master() {
    let mut sim = Simulation::default();
    let port = sim.port();
    sim.engine_mut()
        .reserve(RoleConfig::slave(0x21, port, |frame: &Frame, responder| {
            responder
                .respond_error(frame.function(), ExceptionCode::IllegalDataAddress)
                .expect("respond should be accepted");
        }))
        .unwrap();
    let master = with_master(&mut sim);

    let outcome: Slot = Rc::default();
    sim.engine_mut()
        .request(master, 0x21, &READ, record_outcome(outcome.clone()))
        .unwrap();
    sim.run_until_quiet();

    let outcome = outcome.borrow();
    let frame = outcome.as_ref().and_then(ExchangeOutcome::frame).expect("reply expected");
    assert!(frame.is_exception());
    assert_eq!(frame.function(), 0x83);
    assert_eq!(frame.exception(), Some(ExceptionCode::IllegalDataAddress));
}

#[test]
fn only_one_answer_per_request() {
    let mut sim = Simulation::default();
    let results = Rc::new(RefCell::new(Vec::new()));
    let log = results.clone();
    let port = sim.port();
    sim.engine_mut()
        .reserve(RoleConfig::slave(0x02, port, move |_, responder| {
            let first = responder.respond(&[0x03, 0x02, 0x00, 0x07]);
            let answered = responder.has_responded();
            let second = responder.respond(&[0x03, 0x02, 0x00, 0x08]);
            log.borrow_mut().push((first.is_ok(), answered, second));
        }))
        .unwrap();
    let master = with_master(&mut sim);

    sim.engine_mut().request(master, 0x02, &READ, |_, _| {}).unwrap();
    sim.run_until_quiet();

    let results = results.borrow();
    assert_eq!(results.len(), 1);
    let (first_ok, answered, second) = &results[0];
    assert!(*first_ok);
    assert!(*answered);
    assert!(matches!(
        second,
        Err(EngineError::Busy {
            phase: ChannelPhase::Transmitting,
            ..
        })
    ));
    // request and a single reply
    assert_eq!(sim.bus().transcript().len(), 2);
}

#[test]
fn broadcast_is_not_delivered_to_slaves() {
    let mut sim = Simulation::default();
    let calls = Rc::new(RefCell::new(0u32));
    let seen = calls.clone();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x07, port, move |_, _| *seen.borrow_mut() += 1))
        .unwrap();
    let master = with_master(&mut sim);

    sim.engine_mut()
        .request(master, 0, &[0x06, 0x00, 0x01, 0x00, 0x03], |_, _| {
            panic!("broadcast must not call back")
        })
        .unwrap();
    sim.run_until_quiet();

    assert_eq!(*calls.borrow(), 0);
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(sim.engine().stats(slave).unwrap().foreign_frames, 1);
    assert_eq!(sim.bus().transcript().len(), 1);
}

#[test]
fn silent_handler_does_not_stall_the_slave() {
    let mut sim = Simulation::default();
    let calls = Rc::new(RefCell::new(0u32));
    let seen = calls.clone();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x11, port, move |_, _| *seen.borrow_mut() += 1))
        .unwrap();
    let master = with_master(&mut sim);

    for round in 1..=3u32 {
        let outcome: Slot = Rc::default();
        sim.engine_mut()
            .request(master, 0x11, &READ, record_outcome(outcome.clone()))
            .unwrap();
        sim.run_until_quiet();

        assert_eq!(*calls.borrow(), round);
        assert_eq!(*outcome.borrow(), Some(ExchangeOutcome::NoResponse));
        assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    }
    let stats = sim.engine().stats(slave).unwrap();
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.timeouts, 3);
    assert_eq!(stats.frames_sent, 0);
}

#[test]
fn deferred_respond_after_handler_returns() {
    let mut sim = Simulation::default();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x0A, port, |_, _| {}))
        .unwrap();
    let master = with_master(&mut sim);

    let outcome: Slot = Rc::default();
    sim.engine_mut()
        .request(master, 0x0A, &READ, record_outcome(outcome.clone()))
        .unwrap();
    while sim.engine().phase(slave).unwrap() != ChannelPhase::ProcessingRequest {
        assert!(sim.step(), "slave never took the request");
    }

    sim.engine_mut().respond(slave, &[0x03, 0x02, 0x12, 0x34]).unwrap();
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Transmitting);
    sim.run_until_quiet();

    let outcome = outcome.borrow();
    let frame = outcome.as_ref().and_then(ExchangeOutcome::frame).expect("reply expected");
    assert_eq!(&frame.pdu[..], &[0x03, 0x02, 0x12, 0x34]);
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
}

#[test]
fn decline_closes_request_without_answer() {
    let mut sim = Simulation::default();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x0B, port, |_, _| {}))
        .unwrap();
    let master = with_master(&mut sim);

    sim.engine_mut().request(master, 0x0B, &READ, |_, _| {}).unwrap();
    while sim.engine().phase(slave).unwrap() != ChannelPhase::ProcessingRequest {
        assert!(sim.step());
    }

    sim.engine_mut().decline(slave).unwrap();
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert!(matches!(
        sim.engine_mut().decline(slave),
        Err(EngineError::Busy { .. })
    ));
    assert!(matches!(
        sim.engine_mut().respond(slave, &[0x03, 0x00]),
        Err(EngineError::Busy {
            phase: ChannelPhase::Idle,
            ..
        })
    ));
}

#[test]
fn undecodable_request_is_discarded() {
    let mut sim = Simulation::default();
    let calls = Rc::new(RefCell::new(0u32));
    let seen = calls.clone();
    let port = sim.port();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x03, port, move |_, _| *seen.borrow_mut() += 1))
        .unwrap();
    let mut rogue = sim.port();

    rogue.send(&[0x03, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]).unwrap();
    sim.step();
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Receiving);
    sim.run_until_quiet();

    assert_eq!(*calls.borrow(), 0);
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(sim.engine().stats(slave).unwrap().framing_errors, 1);
}

#[test]
fn slave_without_handler_discards_requests() {
    let mut sim = Simulation::default();
    let port = sim.port();
    let slave = sim.engine_mut().reserve(RoleConfig::new(0x04, port)).unwrap();
    let mut rogue = sim.port();

    rogue
        .send(&FrameConfig::default().encode(0x04, &READ).unwrap())
        .unwrap();
    sim.run_until_quiet();

    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(sim.engine().stats(slave).unwrap().frames_received, 0);
}

struct Unplugged(TransportId);

impl ByteStream for Unplugged {
    fn id(&self) -> TransportId {
        self.0
    }

    fn send(&mut self, _bytes: &[u8]) -> TransportResult<()> {
        Err(TransportError::Detached(self.0))
    }
}

#[test]
fn refused_reply_keeps_request_open_until_it_lapses() {
    let mut sim = Simulation::default();
    let transport = TransportId::new(9001);
    let errors = Rc::new(RefCell::new(Vec::new()));
    let log = errors.clone();
    let slave = sim
        .engine_mut()
        .reserve(RoleConfig::slave(0x0C, Unplugged(transport), move |_, responder| {
            let refused = responder.respond(&[0x03, 0x02, 0x00, 0x01]);
            log.borrow_mut().push((refused, responder.has_responded()));
        }))
        .unwrap();

    for byte in FrameConfig::default().encode(0x0C, &READ).unwrap() {
        assert!(sim.engine_mut().route_byte(transport, byte));
    }
    while sim.engine().phase(slave).unwrap() != ChannelPhase::ProcessingRequest {
        assert!(sim.step(), "request never reached the handler");
    }

    {
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0].0, Err(EngineError::Transport(_))));
        assert!(!errors[0].1);
    }

    sim.run_until_quiet();
    let stats = sim.engine().stats(slave).unwrap();
    assert_eq!(sim.engine().phase(slave).unwrap(), ChannelPhase::Idle);
    assert_eq!(stats.frames_sent, 0);
    assert_eq!(stats.timeouts, 1);
}
