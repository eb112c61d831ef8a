use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rtuprims_engine::{
    ChannelId, EngineConfig, ExchangeOutcome, LineConfig, RoleConfig, Simulation,
};
use rtuprims_frame::BROADCAST;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cmd::bank::{build_request, RegisterBank};
use crate::cmd::{parse_hex, SimulateArgs};
use crate::exit::{config_error, engine_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{hex_string, micros, print_rows, OutputFormat};

/// Contents of a `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub engine: EngineConfig,
    pub line: LineConfig,
}

impl RunConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?;
        let config: Self =
            serde_json::from_str(&text).map_err(|err| config_error("invalid config", err))?;
        config
            .engine
            .validate()
            .map_err(|err| engine_error("invalid config", err))?;
        Ok(config)
    }

    fn apply(&mut self, args: &SimulateArgs) {
        if let Some(baud) = args.baud {
            self.line.baud = baud;
        }
        if let Some(ms) = args.response_timeout_ms {
            self.line.response_timeout = Duration::from_millis(ms);
        }
        if let Some(order) = args.order {
            self.line.frame.checksum_order = order.into();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Response,
    Exception,
    NoResponse,
    /// Broadcast: no reply is expected.
    Sent,
    /// The exchange ended without a usable reply (bad checksum, wrong node).
    Dropped,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Response => "response",
            Outcome::Exception => "exception",
            Outcome::NoResponse => "no_response",
            Outcome::Sent => "sent",
            Outcome::Dropped => "dropped",
        }
    }
}

#[derive(Serialize)]
pub struct ExchangeRow {
    pub seq: u32,
    pub destination: u8,
    pub request: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    pub elapsed_us: u64,
}

impl ExchangeRow {
    pub fn new(
        seq: u32,
        destination: u8,
        request: &[u8],
        outcome: Option<ExchangeOutcome>,
        elapsed: Duration,
    ) -> Self {
        let (outcome, reply) = match outcome {
            Some(ExchangeOutcome::Response(frame)) if frame.is_exception() => {
                (Outcome::Exception, Some(hex_string(&frame.pdu)))
            }
            Some(ExchangeOutcome::Response(frame)) => {
                (Outcome::Response, Some(hex_string(&frame.pdu)))
            }
            Some(ExchangeOutcome::NoResponse) => (Outcome::NoResponse, None),
            None if destination == BROADCAST => (Outcome::Sent, None),
            None => (Outcome::Dropped, None),
        };
        Self {
            seq,
            destination,
            request: hex_string(request),
            outcome,
            reply,
            elapsed_us: micros(elapsed),
        }
    }

    /// Whether the exchange should have produced a reply and did not.
    pub fn missing_reply(&self) -> bool {
        matches!(self.outcome, Outcome::NoResponse | Outcome::Dropped)
    }
}

pub fn print_exchanges(rows: Vec<ExchangeRow>, format: OutputFormat) {
    let rows: Vec<(ExchangeRow, Vec<String>)> = rows
        .into_iter()
        .map(|row| {
            let cells = vec![
                row.seq.to_string(),
                row.destination.to_string(),
                row.request.clone(),
                row.outcome.as_str().to_string(),
                row.reply.clone().unwrap_or_default(),
                row.elapsed_us.to_string(),
            ];
            (row, cells)
        })
        .collect();
    print_rows(
        "exchange",
        &["SEQ", "DEST", "REQUEST", "OUTCOME", "REPLY", "ELAPSED_US"],
        &rows,
        format,
    );
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    config.apply(&args);

    let pdu = match &args.pdu {
        Some(hex) => parse_hex(hex)?,
        None => build_request(args.function, args.start, args.count, args.value),
    };
    let destination = if args.broadcast {
        BROADCAST
    } else {
        args.target.unwrap_or(args.slave_address)
    };

    if args.slave_address == BROADCAST {
        return Err(CliError::new(USAGE, "slave address must be 1-247"));
    }

    let mut sim = Simulation::new(config.engine);
    let (slave_port, master_port) = (sim.port(), sim.port());
    let mut bank = RegisterBank::new(args.registers);
    sim.engine_mut()
        .reserve(
            RoleConfig::slave(args.slave_address, slave_port, move |frame, responder| {
                bank.serve(frame, responder)
            })
            .with_line(config.line),
        )
        .map_err(|err| engine_error("slave reservation failed", err))?;
    let master = sim
        .engine_mut()
        .reserve(RoleConfig::master(master_port).with_line(config.line))
        .map_err(|err| engine_error("master reservation failed", err))?;
    sim.run_until_quiet();
    info!(
        slave = args.slave_address,
        destination,
        baud = config.line.baud,
        "simulated line ready"
    );

    let mut rows = Vec::new();
    for seq in 1..=args.repeat {
        rows.push(exchange(&mut sim, master, destination, &pdu, seq, args.noise)?);
    }
    let missing = rows.iter().filter(|row| row.missing_reply()).count();
    print_exchanges(rows, format);
    debug!(
        master = ?sim.engine().stats(master),
        transcript = sim.bus().transcript().len(),
        "simulation finished"
    );

    Ok(if missing == 0 { SUCCESS } else { TIMEOUT })
}

fn exchange(
    sim: &mut Simulation,
    master: ChannelId,
    destination: u8,
    pdu: &[u8],
    seq: u32,
    noise: bool,
) -> CliResult<ExchangeRow> {
    let slot: Rc<RefCell<Option<ExchangeOutcome>>> = Rc::default();
    let sink = slot.clone();

    if noise {
        sim.bus().inject(&[0xFF]);
    }
    let started = sim.now();
    sim.engine_mut()
        .request(master, destination, pdu, move |_, outcome| {
            *sink.borrow_mut() = Some(outcome)
        })
        .map_err(|err| engine_error("request failed", err))?;

    while slot.borrow().is_none() && sim.step() {}
    let elapsed = sim.now() - started;
    sim.run_until_quiet();

    let outcome = slot.borrow_mut().take();
    Ok(ExchangeRow::new(seq, destination, pdu, outcome, elapsed))
}
