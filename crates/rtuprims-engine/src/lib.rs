//! Master/slave request-response engine for silence-delimited serial buses.
//!
//! The engine owns a fixed table of channels. Each channel is bound to one
//! byte-stream transport and runs either the master or the slave state
//! machine, chosen by its node address (0 is master). It is driven entirely
//! from outside: the owner feeds it transport events and timer expiries,
//! and it calls back into the application with decoded frames.
//!
//! Nothing here blocks. Every state transition happens before the
//! application callback it triggers, so a slave handler can answer
//! synchronously through its [`Responder`].

pub mod channel;
pub mod config;
pub mod error;
pub mod master;
pub mod registry;
pub mod sim;
pub mod slave;

pub use channel::{ChannelId, ChannelPhase, ChannelStats, Role};
pub use config::{Activity, EngineConfig, LineConfig, RoleConfig, DEFAULT_CAPACITY, MAX_CAPACITY};
pub use error::{EngineError, Result};
pub use master::{ExchangeOutcome, ResponseCallback};
pub use registry::{Engine, Released};
pub use sim::Simulation;
pub use slave::{RequestHandler, Responder};

pub use rtuprims_frame::{ExceptionCode, Frame, FrameConfig};
