use std::time::Duration;

use rtuprims_frame::{silence_interval, Frame, FrameConfig};
use rtuprims_transport::{ByteStream, TransportId};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelId, Role};
use crate::error::{EngineError, Result};
use crate::slave::{RequestHandler, Responder};

/// Default number of channel slots.
pub const DEFAULT_CAPACITY: usize = 3;

/// Largest slot table an engine will build. Slot indices must fit a
/// [`ChannelId`].
pub const MAX_CAPACITY: usize = 1024;

/// Readiness notification delivered to a channel's status sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// The channel entered the state that accepts new work
    /// (master: Idle, slave: Idle).
    Ready,
    /// The channel left that state.
    Busy,
}

/// Idle/busy notification sink.
pub type StatusSink = Box<dyn FnMut(ChannelId, Activity)>;

/// Hook chained after the engine's own transmit-complete handling.
pub type TxCompleteHook = Box<dyn FnMut(TransportId)>;

/// Timing and framing parameters of one serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Line speed; only used to derive the silence interval.
    pub baud: u32,
    /// How long a master waits for the first reply byte.
    #[serde(rename = "response_timeout_ms", with = "duration_ms")]
    pub response_timeout: Duration,
    /// Fixed pause after a broadcast before the master may transmit again.
    #[serde(rename = "turnaround_ms", with = "duration_ms")]
    pub turnaround: Duration,
    /// Wire framing options.
    pub frame: FrameConfig,
}

impl LineConfig {
    /// Silence interval that ends a frame on this line.
    pub fn silence(&self) -> Duration {
        silence_interval(self.baud)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud == 0 {
            return Err(EngineError::InvalidLine("baud rate must be greater than zero"));
        }
        if self.response_timeout.is_zero() {
            return Err(EngineError::InvalidLine(
                "response timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud: 9600,
            response_timeout: Duration::from_secs(1),
            turnaround: Duration::from_millis(100),
            frame: FrameConfig::default(),
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of channel slots. Fixed for the engine's lifetime.
    pub capacity: usize,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity > MAX_CAPACITY {
            return Err(EngineError::InvalidConfig("capacity exceeds 1024 channels"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Application-supplied channel configuration, immutable once reserved.
pub struct RoleConfig {
    /// Own node address: 0 runs the master role, 1-247 a slave.
    pub address: u8,
    /// The byte stream this channel is bound to.
    pub transport: Box<dyn ByteStream>,
    pub line: LineConfig,
    /// Unsolicited-frame handler. Slaves without one discard every request.
    pub handler: Option<RequestHandler>,
    pub status: Option<StatusSink>,
    /// Caller's own transmit-complete hook, invoked after the engine's.
    pub tx_complete_hook: Option<TxCompleteHook>,
}

impl RoleConfig {
    pub fn new(address: u8, transport: impl ByteStream + 'static) -> Self {
        Self {
            address,
            transport: Box::new(transport),
            line: LineConfig::default(),
            handler: None,
            status: None,
            tx_complete_hook: None,
        }
    }

    /// Master-role configuration.
    pub fn master(transport: impl ByteStream + 'static) -> Self {
        Self::new(0, transport)
    }

    /// Slave-role configuration answering requests through `handler`.
    pub fn slave<H>(address: u8, transport: impl ByteStream + 'static, handler: H) -> Self
    where
        H: FnMut(&Frame, &mut Responder<'_, '_>) + 'static,
    {
        Self::new(address, transport).with_handler(handler)
    }

    pub fn with_handler<H>(mut self, handler: H) -> Self
    where
        H: FnMut(&Frame, &mut Responder<'_, '_>) + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_line(mut self, line: LineConfig) -> Self {
        self.line = line;
        self
    }

    pub fn with_status<F>(mut self, sink: F) -> Self
    where
        F: FnMut(ChannelId, Activity) + 'static,
    {
        self.status = Some(Box::new(sink));
        self
    }

    pub fn with_tx_complete_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(TransportId) + 'static,
    {
        self.tx_complete_hook = Some(Box::new(hook));
        self
    }

    pub fn role(&self) -> Role {
        Role::for_address(self.address)
    }
}

impl std::fmt::Debug for RoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleConfig")
            .field("address", &self.address)
            .field("transport", &self.transport.id())
            .field("line", &self.line)
            .field("handler", &self.handler.is_some())
            .field("status", &self.status.is_some())
            .field("tx_complete_hook", &self.tx_complete_hook.is_some())
            .finish()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
