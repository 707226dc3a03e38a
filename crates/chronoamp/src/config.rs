use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chronoamp_frame::{FrameConfig, DEFAULT_SENTINEL};
use chronoamp_session::{AcquisitionParameters, ArchiveSource, SessionOptions};
use chronoamp_transport::Endpoint;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, INTERNAL};

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "chronoamp.toml";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub parameters: AcquisitionParameters,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Upper bound on how long a stop request waits for a silent device.
    pub read_timeout_ms: u64,
    pub sentinel: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 80,
            connect_timeout_ms: 5000,
            read_timeout_ms: 500,
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for session logs and archived configurations.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> CliResult<Self> {
        toml::from_str(text)
            .map_err(|err| CliError::new(DATA_INVALID, format!("invalid configuration: {err}")))
    }

    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).map_err(|err| {
            CliError::new(INTERNAL, format!("failed to serialize configuration: {err}"))
        })
    }

    /// Read `path`, or fall back to defaults when it does not exist.
    pub fn load(path: &Path) -> CliResult<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(io_error(&format!("failed reading {}", path.display()), err)),
        }
    }

    /// Read `path`; if it does not exist, write the defaults there first.
    pub fn load_or_init(path: &Path) -> CliResult<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.write(path)?;
        info!(path = %path.display(), "wrote default configuration");
        Ok(config)
    }

    pub fn write(&self, path: &Path) -> CliResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| io_error(&format!("failed creating {}", parent.display()), err))?;
        }
        fs::write(path, self.to_toml()?)
            .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.device.host.clone(), self.device.port)
    }

    /// What to archive next to each session log: the file at `path` as is,
    /// or this configuration rendered to TOML once overrides changed it.
    pub fn archive_source(&self, path: &Path, overridden: bool) -> CliResult<ArchiveSource> {
        if !overridden {
            return Ok(ArchiveSource::File(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        Ok(ArchiveSource::Contents {
            name,
            contents: self.to_toml()?,
        })
    }

    /// Session options for this configuration. `archive` is stored next to
    /// every session log.
    pub fn session_options(&self, archive: Option<ArchiveSource>) -> SessionOptions {
        let mut options = SessionOptions::new(self.endpoint());
        // A zero connect timeout is rejected by the socket layer.
        options.connect_timeout = Duration::from_millis(self.device.connect_timeout_ms.max(1));
        options.frame = FrameConfig {
            read_timeout: Some(Duration::from_millis(self.device.read_timeout_ms.max(1))),
            ..options.frame
        };
        options.output_dir = self.output.dir.clone();
        options.archive = archive.into_iter().collect();
        options.sentinel = self.device.sentinel.clone();
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = Config::default().to_toml().unwrap();
        assert!(text.contains("[device]"));
        assert!(text.contains("pre_stepV"));
        assert!(text.contains("quietTime = 1000"));
        assert_eq!(Config::from_toml(&text).unwrap(), Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config = Config::from_toml(
            "[device]\nhost = \"10.0.0.5\"\n\n[parameters]\nsample_interval = 20\nv1 = [100, 200, 300, 400]\n",
        )
        .unwrap();
        assert_eq!(config.device.host, "10.0.0.5");
        assert_eq!(config.device.port, 80);
        assert_eq!(config.parameters.sample_interval, 20);
        assert_eq!(config.parameters.v1, [100, 200, 300, 400]);
        assert_eq!(config.parameters.gain, [5, 5, 5, 5]);
        assert_eq!(config.output, OutputConfig::default());
    }

    #[test]
    fn wrong_channel_count_is_invalid_data() {
        let err = Config::from_toml("[parameters]\ngain = [1, 2, 3]\n").unwrap_err();
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn load_or_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chronoamp.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        fs::write(&path, "[device]\nport = 8080\n").unwrap();
        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config.device.port, 8080);
    }

    #[test]
    fn load_missing_file_does_not_create_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chronoamp.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn session_options_carry_device_settings() {
        let mut config = Config::default();
        config.device.read_timeout_ms = 250;
        config.device.sentinel = "DONE".to_string();
        config.output.dir = PathBuf::from("/tmp/runs");

        let archive = config.archive_source(Path::new("chronoamp.toml"), false).unwrap();
        let options = config.session_options(Some(archive));
        assert_eq!(options.endpoint.to_string(), "192.168.1.100:80");
        assert_eq!(options.frame.read_timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.output_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(
            options.archive,
            vec![ArchiveSource::File(PathBuf::from("chronoamp.toml"))]
        );
        assert_eq!(options.sentinel, "DONE");
    }

    #[test]
    fn zero_timeouts_are_clamped() {
        let mut config = Config::default();
        config.device.connect_timeout_ms = 0;
        config.device.read_timeout_ms = 0;

        let options = config.session_options(None);
        assert_eq!(options.connect_timeout, Duration::from_millis(1));
        assert_eq!(options.frame.read_timeout, Some(Duration::from_millis(1)));
        assert!(options.archive.is_empty());
    }

    #[test]
    fn overridden_config_is_archived_as_rendered() {
        let mut config = Config::default();
        config.device.port = 8080;

        let source = config
            .archive_source(Path::new("conf/bench.toml"), true)
            .unwrap();
        match source {
            ArchiveSource::Contents { name, contents } => {
                assert_eq!(name, "bench.toml");
                assert_eq!(Config::from_toml(&contents).unwrap(), config);
            }
            other => panic!("expected rendered contents, got {other:?}"),
        }
    }
}
