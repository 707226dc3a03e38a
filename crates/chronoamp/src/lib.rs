//! Chronoamperometry acquisition over a line-oriented TCP stream.
//!
//! chronoamp connects to a potentiostat, sends the acquisition parameters,
//! and turns the device's comma-separated measurement lines into records that
//! are logged to CSV and handed to a live consumer.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connection to the device
//! - [`frame`]: Line framing, record decoding and end-of-stream detection
//! - [`session`]: Handshake, acquisition loop, session log and record handoff

/// Re-export transport types.
pub mod transport {
    pub use chronoamp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use chronoamp_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use chronoamp_session::*;
}
