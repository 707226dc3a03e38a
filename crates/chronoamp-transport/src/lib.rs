//! Byte-stream transport to a remote measurement device.
//!
//! The instrument is reached over plain TCP at a fixed host/port. This is the
//! lowest layer of chronoamp: everything above it only sees the
//! [`DeviceStream`] returned by [`connect`].

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{connect, Endpoint, StreamListener, DEFAULT_CONNECT_TIMEOUT};
pub use traits::DeviceStream;
