//! Acquisition sessions against a chronoamperometry device.
//!
//! This is the "just works" layer: connect, send the acquisition parameters,
//! stream records into a session log and a handoff queue, and stop cleanly on
//! the device's sentinel, a closed connection, an I/O error or cancellation.

pub mod acquisition;
pub mod connector;
pub mod consumer;
pub mod control;
pub mod error;
pub mod handshake;
pub mod listener;
pub mod log;
pub mod queue;

pub use acquisition::{AcquisitionLoop, Connection, EndReason, SessionSummary, Step};
pub use connector::{establish, run_session, spawn_session, Established, SessionHandle, SessionOptions};
pub use consumer::{ConsumerLoop, ConsumerPoll, RecordSink, TimeSeries};
pub use control::{CancellationSignal, SessionState, StateCell};
pub use error::{Result, SessionError};
pub use handshake::{encode_handshake, receive_handshake, send_handshake, AcquisitionParameters};
pub use listener::{DeviceListener, DeviceSession};
pub use log::{ArchiveSource, SessionLog, SessionPaths, LOG_FILE_SUFFIX, STAMP_FORMAT};
pub use queue::{handoff_queue, QueuePoll, RecordReceiver, RecordSender};
