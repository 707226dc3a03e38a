//! Line framing for the device's measurement stream.
//!
//! The device emits newline-terminated, comma-separated lines of exactly
//! twelve numeric fields. TCP delivers those lines at arbitrary chunk
//! boundaries, so this crate:
//! - buffers partial lines across reads ([`LineBuffer`])
//! - validates and unit-normalizes complete lines ([`decode_frame`])
//! - recognizes the end of the stream ([`TerminationDetector`])
//!
//! [`FrameReader`] ties the three together over any `Read` stream.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod reader;
pub mod sentinel;
pub mod writer;

pub use buffer::{CandidateFrame, LineBuffer, LINE_TERMINATOR};
pub use codec::{
    decode_frame, ChannelReading, DecodedFrame, RawFrame, Record, Reject, CHANNEL_COUNT,
    CURRENT_FIELDS, CURRENT_SCALE, FIELD_COUNT, HEADERS,
};
pub use error::{FrameError, Result};
pub use reader::{Batch, FrameConfig, FrameReader, DEFAULT_MAX_PENDING, DEFAULT_READ_CHUNK_SIZE};
pub use sentinel::{Termination, TerminationDetector, DEFAULT_SENTINEL};
pub use writer::LineWriter;
