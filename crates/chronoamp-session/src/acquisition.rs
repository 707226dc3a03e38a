//! The streaming half of a session.
//!
//! [`AcquisitionLoop::step`] performs one iteration: cancellation check,
//! one bounded read, decode/log/push for every completed line, then the
//! end-of-stream check. [`AcquisitionLoop::run`] drives steps until one of
//! them finishes the session and then releases the connection and the log.

use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;

use chronoamp_frame::{decode_frame, CandidateFrame, FrameReader, Termination};
use chronoamp_transport::DeviceStream;
use tracing::{debug, info, trace, warn};

use crate::control::{CancellationSignal, SessionState, StateCell};
use crate::error::Result;
use crate::log::SessionLog;
use crate::queue::RecordSender;

/// A readable connection the loop can close when it is done.
pub trait Connection: Read {
    /// Release the connection. Called once, from `Closing`.
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Connection for DeviceStream {
    fn close(&mut self) -> std::io::Result<()> {
        self.shutdown()
            .map_err(|err| std::io::Error::other(err.to_string()))
    }
}

impl<T: AsRef<[u8]>> Connection for Cursor<T> {}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The device sent the end-of-stream sentinel.
    Sentinel,
    /// The device closed the connection.
    PeerClosed,
    /// The owning process requested a stop.
    Cancelled,
    /// Reading, or writing the log, failed mid-stream.
    IoError(String),
}

impl EndReason {
    /// Sentinel and peer close are the device's own way of finishing.
    pub fn is_clean(&self) -> bool {
        matches!(self, EndReason::Sentinel | EndReason::PeerClosed)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Sentinel => f.write_str("sentinel"),
            EndReason::PeerClosed => f.write_str("peer closed"),
            EndReason::Cancelled => f.write_str("cancelled"),
            EndReason::IoError(message) => write!(f, "i/o error: {message}"),
        }
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(EndReason),
}

/// Counters reported once the session is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Complete lines seen.
    pub frames: u64,
    /// Lines accepted, logged and queued.
    pub records: u64,
    /// Lines discarded by the decoder.
    pub rejected: u64,
    pub end_reason: EndReason,
    /// Session log file, when the log is file-backed.
    pub log_path: Option<PathBuf>,
}

/// Owns the connection, the line buffer and the session log for the
/// duration of one session.
pub struct AcquisitionLoop<R, W: Write = File> {
    reader: FrameReader<R>,
    log: SessionLog<W>,
    queue: RecordSender,
    cancel: CancellationSignal,
    state: StateCell,
    frames: u64,
    records: u64,
    rejected: u64,
    consumer_gone: bool,
}

impl<R: Connection, W: Write> AcquisitionLoop<R, W> {
    pub fn new(
        reader: FrameReader<R>,
        log: SessionLog<W>,
        queue: RecordSender,
        cancel: CancellationSignal,
    ) -> Self {
        Self::with_state(reader, log, queue, cancel, StateCell::new())
    }

    /// Report transitions through an existing [`StateCell`].
    pub fn with_state(
        reader: FrameReader<R>,
        log: SessionLog<W>,
        queue: RecordSender,
        cancel: CancellationSignal,
        state: StateCell,
    ) -> Self {
        Self {
            reader,
            log,
            queue,
            cancel,
            state,
            frames: 0,
            records: 0,
            rejected: 0,
            consumer_gone: false,
        }
    }

    /// Shared view of this loop's state.
    pub fn state(&self) -> &StateCell {
        &self.state
    }

    /// Rows appended to the session log so far.
    pub fn rows(&self) -> u64 {
        self.log.rows()
    }

    /// One iteration of the streaming state.
    ///
    /// Lines completed by the read are fully processed before the
    /// end-of-stream check, so a read carrying both data and the sentinel
    /// loses nothing.
    pub fn step(&mut self) -> Result<Step> {
        if self.cancel.is_cancelled() {
            return Ok(Step::Finished(EndReason::Cancelled));
        }

        let batch = self.reader.read_batch()?;
        if batch.is_idle() {
            trace!("read timed out with no data");
            return Ok(Step::Continue);
        }

        for frame in &batch.frames {
            self.accept(frame)?;
        }

        Ok(match batch.termination {
            Some(Termination::Sentinel) => Step::Finished(EndReason::Sentinel),
            Some(Termination::PeerClosed) => Step::Finished(EndReason::PeerClosed),
            None => Step::Continue,
        })
    }

    fn accept(&mut self, frame: &CandidateFrame) -> Result<()> {
        self.frames += 1;
        let decoded = match decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(reject) => {
                self.rejected += 1;
                debug!(%reject, bytes = frame.len(), "discarded line");
                return Ok(());
            }
        };

        // Log first: a row on disk is never missing from the queue's history.
        self.log.append(&decoded.raw)?;
        self.records += 1;

        if !self.consumer_gone && self.queue.push(decoded.record).is_err() {
            warn!("consumer went away; continuing to log only");
            self.consumer_gone = true;
        }
        Ok(())
    }

    /// Stream until the session ends, then close.
    ///
    /// Never fails: a mid-stream error ends the session with
    /// [`EndReason::IoError`] and the rows already written stay valid.
    pub fn run(mut self) -> SessionSummary {
        self.state.set(SessionState::Streaming);

        let end_reason = loop {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Finished(reason)) => break reason,
                Err(err) => {
                    warn!(error = %err, "acquisition failed mid-stream");
                    break EndReason::IoError(err.to_string());
                }
            }
        };

        self.close(end_reason)
    }

    fn close(self, end_reason: EndReason) -> SessionSummary {
        self.state.set(SessionState::Closing);

        let mut connection = self.reader.into_inner();
        if let Err(err) = connection.close() {
            warn!(error = %err, "failed to close connection");
        }

        let log_path = self.log.path().map(|p| p.to_path_buf());
        let rows = self.log.rows();
        if let Err(err) = self.log.close() {
            warn!(error = %err, "failed to close session log");
        }

        self.state.set(SessionState::Closed);
        info!(
            %end_reason,
            frames = self.frames,
            records = self.records,
            rejected = self.rejected,
            rows,
            "session closed"
        );

        SessionSummary {
            frames: self.frames,
            records: self.records,
            rejected: self.rejected,
            end_reason,
            log_path,
        }
    }
}
