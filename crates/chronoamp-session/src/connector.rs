//! Session setup and the dedicated acquisition thread.

use std::fs::File;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chronoamp_frame::{
    FrameConfig, FrameReader, LineWriter, TerminationDetector, DEFAULT_SENTINEL,
};
use chronoamp_transport::{connect, DeviceStream, Endpoint, DEFAULT_CONNECT_TIMEOUT};
use tracing::{error, info, warn};

use crate::acquisition::{AcquisitionLoop, SessionSummary};
use crate::control::{CancellationSignal, SessionState, StateCell};
use crate::error::{Result, SessionError};
use crate::handshake::{send_handshake, AcquisitionParameters};
use crate::log::{ArchiveSource, SessionLog, SessionPaths};
use crate::queue::RecordSender;

/// Read timeout applied when none is configured; bounds how long a stop
/// request can go unnoticed while the device is silent.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to run one session besides the acquisition parameters.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub endpoint: Endpoint,
    pub connect_timeout: Duration,
    pub frame: FrameConfig,
    /// Directory receiving the session log and archived companions.
    pub output_dir: PathBuf,
    /// Companions stored next to the log under the session stamp (e.g. the
    /// active configuration).
    pub archive: Vec<ArchiveSource>,
    pub sentinel: String,
}

impl SessionOptions {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            frame: FrameConfig {
                read_timeout: Some(DEFAULT_READ_TIMEOUT),
                ..FrameConfig::default()
            },
            output_dir: PathBuf::from("."),
            archive: Vec::new(),
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

/// A connected, handshaken session ready to stream.
pub struct Established {
    pub reader: FrameReader<DeviceStream>,
    pub log: SessionLog<File>,
    pub paths: SessionPaths,
}

/// Run `Connecting` and `Handshaking`, then open the session log.
///
/// Any error here is fatal for the session: there is no retry.
pub fn establish(
    options: &SessionOptions,
    params: &AcquisitionParameters,
    state: &StateCell,
) -> Result<Established> {
    state.set(SessionState::Connecting);
    let stream = connect(&options.endpoint, options.connect_timeout)?;

    state.set(SessionState::Handshaking);
    let mut writer = LineWriter::with_config_device(stream.try_clone()?, &options.frame)?;
    send_handshake(&mut writer, params)?;

    std::fs::create_dir_all(&options.output_dir)?;
    let paths = SessionPaths::now(&options.output_dir);
    for source in &options.archive {
        // Losing the archived copy must not cost the measurement.
        if let Err(err) = paths.archive(source) {
            warn!(source = %source, error = %err, "failed to archive file");
        }
    }
    let log = SessionLog::create(paths.log_path())?;

    let reader = FrameReader::with_config_device(stream, options.frame.clone())?
        .with_detector(TerminationDetector::new(&options.sentinel));

    Ok(Established { reader, log, paths })
}

/// Run a whole session on the calling thread.
///
/// Returns `Err` only when the session could not be set up; once streaming
/// has begun the outcome is reported through [`SessionSummary::end_reason`].
pub fn run_session(
    options: &SessionOptions,
    params: &AcquisitionParameters,
    sender: RecordSender,
    cancel: CancellationSignal,
    state: StateCell,
) -> Result<SessionSummary> {
    let established = match establish(options, params, &state) {
        Ok(established) => established,
        Err(err) => {
            state.set(SessionState::Closed);
            return Err(err);
        }
    };

    info!(
        endpoint = %options.endpoint,
        stamp = established.paths.stamp(),
        "streaming"
    );
    let acquisition =
        AcquisitionLoop::with_state(established.reader, established.log, sender, cancel, state);
    Ok(acquisition.run())
}

/// Start a session on a dedicated background thread.
pub fn spawn_session(
    options: SessionOptions,
    params: AcquisitionParameters,
    sender: RecordSender,
    cancel: CancellationSignal,
) -> Result<SessionHandle> {
    let state = StateCell::new();
    let thread_state = state.clone();
    let thread = thread::Builder::new()
        .name("acquisition".to_string())
        .spawn(move || run_session(&options, &params, sender, cancel, thread_state))?;
    Ok(SessionHandle { state, thread })
}

/// Foreground handle on a background session.
pub struct SessionHandle {
    state: StateCell,
    thread: JoinHandle<Result<SessionSummary>>,
}

impl SessionHandle {
    /// Current state of the session.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the session to reach `Closed`.
    ///
    /// The session log is closed by the time this returns.
    pub fn join(self) -> Result<SessionSummary> {
        match self.thread.join() {
            Ok(result) => result,
            Err(_) => {
                error!("acquisition thread panicked");
                Err(SessionError::Panicked)
            }
        }
    }
}
