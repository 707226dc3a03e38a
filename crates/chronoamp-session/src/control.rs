use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Process-wide stop request, observed by the acquisition loop between
/// iterations.
///
/// Set-once: there is no reset. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    flag: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the session to stop at the next iteration boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Handshaking = 1,
    Streaming = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Handshaking,
            2 => SessionState::Streaming,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Handshaking => "handshaking",
            SessionState::Streaming => "streaming",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared view of a session's current [`SessionState`].
///
/// Written only by the acquisition task; any other thread may read it.
#[derive(Debug, Clone)]
pub struct StateCell {
    state: Arc<AtomicU8>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SessionState::Connecting as u8)),
        }
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_shared_and_sticky() {
        let signal = CancellationSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_cancelled());

        signal.cancel();
        assert!(observer.is_cancelled());
        signal.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn cancellation_crosses_threads() {
        let signal = CancellationSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn state_cell_tracks_transitions() {
        let cell = StateCell::new();
        let view = cell.clone();
        assert_eq!(view.get(), SessionState::Connecting);

        for state in [
            SessionState::Handshaking,
            SessionState::Streaming,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            cell.set(state);
            assert_eq!(view.get(), state);
        }
        assert!(view.get().is_terminal());
        assert_eq!(view.get().to_string(), "closed");
    }
}
