use std::path::PathBuf;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] chronoamp_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] chronoamp_frame::FrameError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session log could not be created.
    #[error("failed to create session log {path}: {source}")]
    LogCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row could not be written to the session log.
    #[error("session log write failed: {0}")]
    LogWrite(#[from] csv::Error),

    /// Filesystem or socket I/O outside the framing layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The acquisition thread panicked.
    #[error("acquisition thread panicked")]
    Panicked,
}

pub type Result<T> = std::result::Result<T, SessionError>;
