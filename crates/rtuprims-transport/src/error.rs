/// Errors that can occur in byte-stream transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The stream is no longer attached to its medium.
    #[error("transport {0} is detached")]
    Detached(crate::TransportId),

    /// Failed to open a serial device.
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
