/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The node address is outside 0-247.
    #[error("invalid node address {0} (expected 0-247)")]
    InvalidAddress(u8),

    /// A frame must carry at least a function code.
    #[error("empty function payload")]
    EmptyPdu,

    /// The function payload exceeds the frame budget.
    #[error("function payload too large ({size} bytes, max {max})")]
    PduTooLarge { size: usize, max: usize },

    /// Too few bytes to hold address, function and checksum.
    #[error("frame too short ({len} bytes)")]
    TooShort { len: usize },

    /// The checksum did not validate at any accepted start offset.
    #[error("checksum mismatch over {len} bytes")]
    ChecksumMismatch { len: usize },
}

impl FrameError {
    /// Whether this error describes received data rather than caller input.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            FrameError::TooShort { .. } | FrameError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
