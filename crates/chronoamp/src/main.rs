mod cmd;
mod config;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chronoamp", version, about = "Chronoamperometry acquisition CLI")]
struct Cli {
    /// Configuration file. Created with defaults by `acquire` if missing.
    #[arg(
        long,
        value_name = "PATH",
        env = "CHRONOAMP_CONFIG",
        default_value = config::DEFAULT_CONFIG_FILE,
        global = true
    )]
    config: PathBuf,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.config, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
