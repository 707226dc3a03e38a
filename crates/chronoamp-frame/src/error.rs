/// Errors that can occur while framing the device stream.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The unterminated tail grew past the configured bound.
    #[error("unterminated line too long ({size} bytes, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An I/O error occurred while reading or writing lines.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer stopped accepting bytes mid-write.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
