use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod acquire;
pub mod config;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the device, stream one session and log it.
    Acquire(AcquireArgs),
    /// Show or create the configuration file.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Stand in for the device: accept one client and stream synthetic data.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, config_path: &Path, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Acquire(args) => acquire::run(args, config_path, format),
        Command::Config(command) => config::run(command, config_path, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct AcquireArgs {
    /// Device host (overrides the configuration file).
    #[arg(long)]
    pub host: Option<String>,
    /// Device port (overrides the configuration file).
    #[arg(long)]
    pub port: Option<u16>,
    /// Directory for the session log (overrides the configuration file).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
    /// Stop the session after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Consumer sleep between empty polls (e.g. 50ms).
    #[arg(long, default_value = "50ms")]
    pub poll_interval: String,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write the default configuration.
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub bind: String,
    /// Measurement lines to send before the sentinel.
    #[arg(long, default_value = "50")]
    pub records: u32,
    /// Delay between lines (defaults to the client's sample interval).
    #[arg(long)]
    pub interval: Option<String>,
    /// How long to wait for the client's parameters.
    #[arg(long, default_value = "10s")]
    pub handshake_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert_eq!(parse_duration("0s").unwrap_err().code, USAGE);
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
