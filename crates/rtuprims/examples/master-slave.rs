//! Master/slave example: one master polls two slaves on a simulated line.
//!
//! Run with:
//!   cargo run --example master-slave

use std::cell::RefCell;
use std::rc::Rc;

use rtuprims::engine::{ExceptionCode, ExchangeOutcome, RoleConfig, Simulation};
use rtuprims::frame::function::{READ_HOLDING_REGISTERS, WRITE_SINGLE_REGISTER};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut sim = Simulation::default();

    // Slave 1 answers reads with a fixed temperature register.
    let port = sim.port();
    sim.engine_mut().reserve(RoleConfig::slave(1, port, |frame, responder| {
        match frame.function() {
            READ_HOLDING_REGISTERS => {
                let _ = responder.respond(&[READ_HOLDING_REGISTERS, 0x02, 0x00, 0xE1]);
            }
            other => {
                let _ = responder.respond_error(other, ExceptionCode::IllegalFunction);
            }
        }
    }))?;

    // Slave 2 accepts writes only.
    let port = sim.port();
    sim.engine_mut().reserve(RoleConfig::slave(2, port, |frame, responder| {
        if frame.function() == WRITE_SINGLE_REGISTER {
            let _ = responder.respond(&frame.pdu);
        } else {
            let _ = responder.respond_error(frame.function(), ExceptionCode::IllegalFunction);
        }
    }))?;

    let port = sim.port();
    let master = sim.engine_mut().reserve(RoleConfig::master(port))?;
    sim.run_until_quiet();

    let requests: [(u8, &[u8]); 3] = [
        (1, &[READ_HOLDING_REGISTERS, 0x00, 0x00, 0x00, 0x01]),
        (2, &[WRITE_SINGLE_REGISTER, 0x00, 0x10, 0x00, 0x2A]),
        (2, &[READ_HOLDING_REGISTERS, 0x00, 0x10, 0x00, 0x01]),
    ];
    for (address, pdu) in requests {
        let result = Rc::new(RefCell::new(None));
        let sink = result.clone();
        sim.engine_mut().request(master, address, pdu, move |_, outcome| {
            *sink.borrow_mut() = Some(outcome);
        })?;
        sim.run_until_quiet();

        let outcome = result.borrow_mut().take();
        match outcome {
            Some(ExchangeOutcome::Response(frame)) if frame.is_exception() => {
                eprintln!("[master] slave {address} exception {:?}", frame.exception());
            }
            Some(ExchangeOutcome::Response(frame)) => {
                eprintln!("[master] slave {address} replied {:02x?}", &frame.pdu[..]);
            }
            Some(ExchangeOutcome::NoResponse) | None => {
                eprintln!("[master] slave {address} did not answer");
            }
        }
    }

    eprintln!("[master] stats: {:?}", sim.engine().stats(master)?);
    eprintln!("[bus] {} transmissions at t={:?}", sim.bus().transcript().len(), sim.now());
    Ok(())
}
