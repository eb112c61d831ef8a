use rtuprims_frame::FrameError;
use rtuprims_transport::{TransportError, TransportId};

use crate::channel::{ChannelId, ChannelPhase, Role};

/// Errors returned synchronously by engine operations.
///
/// Framing failures on received data never appear here; they are absorbed
/// by the state machines and counted in [`crate::ChannelStats`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed address, empty payload or oversized frame. Nothing was sent.
    #[error("bad input: {0}")]
    BadInput(#[from] FrameError),

    /// The line configuration cannot be used.
    #[error("invalid line configuration: {0}")]
    InvalidLine(&'static str),

    /// The engine configuration cannot be used.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),

    /// The channel is not in the one state that permits the operation.
    #[error("channel {channel} busy ({phase})")]
    Busy {
        channel: ChannelId,
        phase: ChannelPhase,
    },

    /// Every channel slot is reserved.
    #[error("no free channel slot (capacity {capacity})")]
    NoResources { capacity: usize },

    /// The operation belongs to the other role.
    #[error("{operation} not permitted on a {role} channel")]
    RoleViolation {
        operation: &'static str,
        role: Role,
    },

    /// The handle was never issued or its channel has been released.
    #[error("unknown or released channel {0}")]
    UnknownChannel(ChannelId),

    /// Another channel is already bound to this transport.
    #[error("transport {0} already bound to a channel")]
    TransportInUse(TransportId),

    /// The transport refused the bytes. Channel state is unchanged.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
