use crate::tcp::Endpoint;

/// Errors that can occur while reaching or talking to the device.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host name did not resolve to any socket address.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// Failed to connect to the device.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
