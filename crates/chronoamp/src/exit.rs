use std::fmt;
use std::io;

use chronoamp_frame::FrameError;
use chronoamp_session::SessionError;
use chronoamp_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Resolve { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        TransportError::Connect { ref source, .. } => {
            let code = io_error(context, io::Error::from(source.kind())).code;
            CliError::new(code, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::LineTooLong { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    match err {
        SessionError::Transport(err) => transport_error(context, err),
        SessionError::Frame(err) => frame_error(context, err),
        SessionError::Io(err) => io_error(context, err),
        SessionError::LogCreate { ref source, .. } => {
            let code = io_error(context, io::Error::from(source.kind())).code;
            CliError::new(code, format!("{context}: {err}"))
        }
        SessionError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        SessionError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SessionError::HandshakeFailed(_) | SessionError::Disconnected(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronoamp_transport::Endpoint;

    #[test]
    fn refused_connection_is_a_transport_error() {
        let err = TransportError::Connect {
            endpoint: Endpoint::new("127.0.0.1", 9),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = session_error("connect failed", SessionError::Transport(err));
        assert_eq!(cli.code, TRANSPORT_ERROR);
        assert!(cli.message.starts_with("connect failed: "));
        assert!(cli.message.contains("127.0.0.1:9"));
    }

    #[test]
    fn connect_timeout_maps_to_timeout() {
        let err = TransportError::Connect {
            endpoint: Endpoint::new("10.0.0.1", 80),
            source: io::Error::from(io::ErrorKind::TimedOut),
        };
        assert_eq!(transport_error("connect", err).code, TIMEOUT);
    }

    #[test]
    fn oversized_line_is_invalid_data() {
        let err = FrameError::LineTooLong { size: 70_000, max: 65_536 };
        assert_eq!(frame_error("read", err).code, DATA_INVALID);
    }

    #[test]
    fn panicked_session_is_internal() {
        assert_eq!(session_error("join", SessionError::Panicked).code, INTERNAL);
    }
}
