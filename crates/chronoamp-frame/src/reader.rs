use std::io::{ErrorKind, Read};

use chronoamp_transport::DeviceStream;
use tracing::trace;

use crate::buffer::{CandidateFrame, LineBuffer};
use crate::error::{FrameError, Result};
use crate::sentinel::{Termination, TerminationDetector};

/// Bytes requested from the stream per read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Upper bound on an unterminated tail: 64 KiB.
pub const DEFAULT_MAX_PENDING: usize = 64 * 1024;

/// Configuration for reading and writing the line stream.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes taken from the stream per read. Default: 1024.
    pub read_chunk_size: usize,
    /// Maximum unterminated bytes held between reads. Default: 64 KiB.
    pub max_pending: usize,
    /// Read timeout for blocking operations. Bounds cancellation latency.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_pending: DEFAULT_MAX_PENDING,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Outcome of one bounded read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Lines completed by this read, in stream order.
    pub frames: Vec<CandidateFrame>,
    /// Set when this read ended the stream. Frames are still valid and must
    /// be processed before acting on it.
    pub termination: Option<Termination>,
    /// Bytes taken from the stream by this read.
    pub bytes_read: usize,
}

impl Batch {
    /// A read that timed out before any data arrived.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.bytes_read == 0 && self.termination.is_none()
    }
}

/// Reads the device stream one bounded chunk at a time.
///
/// Handles partial lines internally: callers only ever see complete lines.
pub struct FrameReader<T> {
    inner: T,
    buffer: LineBuffer,
    detector: TerminationDetector,
    config: FrameConfig,
    chunk: Vec<u8>,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buffer: LineBuffer::new(),
            detector: TerminationDetector::default(),
            chunk: vec![0u8; config.read_chunk_size.max(1)],
            config,
        }
    }

    /// Replace the end-of-stream detector.
    pub fn with_detector(mut self, detector: TerminationDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Perform one read (blocking up to the read timeout).
    ///
    /// A timed-out read yields [`Batch::idle`]. A zero-byte read yields a
    /// batch terminated with [`Termination::PeerClosed`].
    pub fn read_batch(&mut self) -> Result<Batch> {
        let read = loop {
            match self.inner.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(Batch::idle());
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        };

        self.buffer.extend(&self.chunk[..read]);
        let termination = self.detector.check(read, self.buffer.combined());
        let frames = self.buffer.drain_frames();

        let pending = self.buffer.pending_len();
        trace!(read, frames = frames.len(), pending, "read batch");

        if termination.is_none() && pending > self.config.max_pending {
            return Err(FrameError::LineTooLong {
                size: pending,
                max: self.config.max_pending,
            });
        }

        Ok(Batch {
            frames,
            termination,
            bytes_read: read,
        })
    }

    /// Bytes buffered but not yet part of a complete line.
    pub fn pending_len(&self) -> usize {
        self.buffer.pending_len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameReader<DeviceStream> {
    /// Create a frame reader for `DeviceStream` and apply read timeout from config.
    pub fn with_config_device(inner: DeviceStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_frame_error(err: chronoamp_transport::TransportError) -> FrameError {
    match err {
        chronoamp_transport::TransportError::Io(io) => FrameError::Io(io),
        chronoamp_transport::TransportError::Connect { source, .. }
        | chronoamp_transport::TransportError::Resolve { source, .. } => FrameError::Io(source),
    }
}
