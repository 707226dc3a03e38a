use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chronoamp_frame::{RawFrame, HEADERS};
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Timestamp prefix shared by a session's log and its archived companions.
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// File name suffix of the session log.
pub const LOG_FILE_SUFFIX: &str = "chronoamperometry.csv";

/// Where one session's files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    dir: PathBuf,
    stamp: String,
}

impl SessionPaths {
    pub fn new(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
        }
    }

    /// Paths stamped with the current local time.
    pub fn now(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, chrono::Local::now().format(STAMP_FORMAT).to_string())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stamp(&self) -> &str {
        &self.stamp
    }

    /// `<dir>/<stamp>_chronoamperometry.csv`
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}", self.stamp, LOG_FILE_SUFFIX))
    }

    /// `<dir>/<stamp>_<file name of source>`
    pub fn archive_path(&self, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        self.stamped(&name)
    }

    fn stamped(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}_{}", self.stamp, name))
    }

    /// Store `source` next to the session log under the session's stamp.
    pub fn archive(&self, source: &ArchiveSource) -> Result<PathBuf> {
        let target = match source {
            ArchiveSource::File(path) => {
                let target = self.archive_path(path);
                std::fs::copy(path, &target)?;
                target
            }
            ArchiveSource::Contents { name, contents } => {
                let target = self.stamped(name);
                std::fs::write(&target, contents)?;
                target
            }
        };
        debug!(source = %source, target = %target.display(), "archived file");
        Ok(target)
    }
}

/// A companion stored next to the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Copy an existing file.
    File(PathBuf),
    /// Write text that only exists in memory, e.g. a configuration with
    /// command line overrides applied.
    Contents { name: String, contents: String },
}

impl From<PathBuf> for ArchiveSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Contents { name, .. } => write!(f, "{name} (generated)"),
        }
    }
}

/// Append-only CSV log of every accepted line.
///
/// The header row is written on creation. Every row is flushed as soon as it
/// is written, so an abrupt exit loses at most the row in flight. Dropping
/// the log flushes it as well.
pub struct SessionLog<W: Write = File> {
    writer: csv::Writer<W>,
    path: Option<PathBuf>,
    rows: u64,
}

impl SessionLog<File> {
    /// Create the log file at `path` and write the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| SessionError::LogCreate {
            path: path.to_path_buf(),
            source,
        })?;
        let mut log = Self::from_writer(file)?;
        log.path = Some(path.to_path_buf());
        info!(path = %path.display(), "session log opened");
        Ok(log)
    }
}

impl<W: Write> SessionLog<W> {
    /// Wrap an arbitrary writer and write the header row.
    pub fn from_writer(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(HEADERS)?;
        writer.flush()?;
        Ok(Self {
            writer,
            path: None,
            rows: 0,
        })
    }

    /// Append one row and flush it.
    pub fn append(&mut self, raw: &RawFrame) -> Result<()> {
        self.writer.write_record(raw.iter())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// File backing this log, if it was created from a path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and release the log.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        if let Some(path) = &self.path {
            info!(path = %path.display(), rows = self.rows, "session log closed");
        }
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| {
                let source = err.error();
                SessionError::Io(std::io::Error::new(source.kind(), source.to_string()))
            })
    }
}
