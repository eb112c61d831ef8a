//! Real-line master and slave, polling a serial port against the
//! monotonic timer service.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtuprims_engine::{
    ChannelPhase, Engine, EngineConfig, ExchangeOutcome, FrameConfig, LineConfig, RoleConfig,
};
use rtuprims_frame::BROADCAST;
use rtuprims_transport::{open_serial, MonotonicTimers, SerialReader, StreamEvent, TransportId};
use tracing::info;

use crate::cmd::bank::RegisterBank;
use crate::cmd::simulate::{print_exchanges, ExchangeRow};
use crate::cmd::{parse_hex, MasterArgs, OrderArg, SlaveArgs};
use crate::exit::{
    engine_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_record, OutputFormat, Record};

/// Longest wait on the port when no timer is pending.
const IDLE_POLL: Duration = Duration::from_millis(50);

const PORT_ID: TransportId = TransportId::new(1);

fn line_config(baud: u32, order: OrderArg) -> LineConfig {
    LineConfig {
        baud,
        frame: FrameConfig {
            checksum_order: order.into(),
        },
        ..LineConfig::default()
    }
}

pub fn run_master(args: MasterArgs, format: OutputFormat) -> CliResult<i32> {
    let pdu = parse_hex(&args.pdu)?;
    let line = LineConfig {
        response_timeout: Duration::from_millis(args.response_timeout_ms),
        ..line_config(args.baud, args.order)
    };

    let (stream, mut reader) = open_serial(&args.port, args.baud, PORT_ID)
        .map_err(|err| transport_error("open failed", err))?;
    let mut engine = Engine::new(EngineConfig { capacity: 1 }, MonotonicTimers::new());
    let master = engine
        .reserve(RoleConfig::master(stream).with_line(line))
        .map_err(|err| engine_error("reservation failed", err))?;

    let slot: Rc<RefCell<Option<ExchangeOutcome>>> = Rc::default();
    let mut events = Vec::new();
    // Generous bound covering a busy line at startup plus a full timeout.
    let deadline = Instant::now() + line.response_timeout * 4 + Duration::from_secs(1);
    let mut sent_at = None;

    loop {
        let phase = engine
            .phase(master)
            .map_err(|err| engine_error("channel lost", err))?;
        match sent_at {
            None if phase == ChannelPhase::Idle => {
                let sink = slot.clone();
                engine
                    .request(master, args.address, &pdu, move |_, outcome| {
                        *sink.borrow_mut() = Some(outcome)
                    })
                    .map_err(|err| engine_error("request failed", err))?;
                sent_at = Some(Instant::now());
            }
            Some(started) => {
                let outcome = slot.borrow_mut().take();
                let finished = outcome.is_some() || phase == ChannelPhase::Idle;
                if finished {
                    let row = ExchangeRow::new(1, args.address, &pdu, outcome, started.elapsed());
                    let missing = row.missing_reply();
                    print_exchanges(vec![row], format);
                    return Ok(if missing { TIMEOUT } else { SUCCESS });
                }
            }
            None => {}
        }

        if Instant::now() >= deadline {
            let message = if sent_at.is_none() {
                "line never went quiet"
            } else {
                "exchange did not complete"
            };
            return Err(CliError::new(TIMEOUT, message));
        }
        pump(&mut engine, &mut reader, &mut events)?;
    }
}

pub fn run_slave(args: SlaveArgs, format: OutputFormat) -> CliResult<i32> {
    if args.address == BROADCAST {
        return Err(CliError::new(USAGE, "slave address must be 1-247"));
    }
    let line = line_config(args.baud, args.order);

    let (stream, mut reader) = open_serial(&args.port, args.baud, PORT_ID)
        .map_err(|err| transport_error("open failed", err))?;
    let mut engine = Engine::new(EngineConfig { capacity: 1 }, MonotonicTimers::new());
    let mut bank = RegisterBank::new(args.registers);
    let slave = engine
        .reserve(
            RoleConfig::slave(args.address, stream, move |frame, responder| {
                bank.serve(frame, responder)
            })
            .with_line(line),
        )
        .map_err(|err| engine_error("reservation failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    info!(port = %args.port, address = args.address, "serving register bank");

    let mut events = Vec::new();
    while running.load(Ordering::SeqCst) {
        pump(&mut engine, &mut reader, &mut events)?;
    }

    let released = engine
        .release(slave)
        .map_err(|err| engine_error("release failed", err))?;
    let stats = released.stats;
    let fields = vec![
        ("frames_received", stats.frames_received.to_string()),
        ("frames_sent", stats.frames_sent.to_string()),
        ("framing_errors", stats.framing_errors.to_string()),
        ("foreign_frames", stats.foreign_frames.to_string()),
        ("overflows", stats.overflows.to_string()),
    ];
    print_record(
        Record {
            kind: "channel-stats",
            body: &stats,
            fields,
            raw: &[],
        },
        format,
    );
    Ok(SUCCESS)
}

/// Wait for input until the next timer deadline, then feed the engine.
fn pump(
    engine: &mut Engine<MonotonicTimers>,
    reader: &mut SerialReader,
    events: &mut Vec<StreamEvent>,
) -> CliResult<()> {
    let wait = engine
        .timers()
        .time_to_next(Instant::now())
        .map_or(IDLE_POLL, |next| next.min(IDLE_POLL));
    reader
        .poll(wait, events)
        .map_err(|err| transport_error("read failed", err))?;
    for event in events.drain(..) {
        engine.dispatch(event);
    }
    for handle in engine.timers_mut().expired(Instant::now()) {
        engine.on_timer(handle);
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
