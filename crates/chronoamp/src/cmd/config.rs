use std::path::Path;

use crate::cmd::{ConfigCommand, ConfigInitArgs};
use crate::config::Config;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, USAGE};
use crate::output::OutputFormat;

pub fn run(command: ConfigCommand, config_path: &Path, format: OutputFormat) -> CliResult<i32> {
    match command {
        ConfigCommand::Show => show(config_path, format),
        ConfigCommand::Init(args) => init(args, config_path),
    }
}

fn show(config_path: &Path, format: OutputFormat) -> CliResult<i32> {
    let config = Config::load(config_path)?;
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string(&config).map_err(|err| {
                CliError::new(INTERNAL, format!("failed to serialize configuration: {err}"))
            })?;
            println!("{text}");
        }
        _ => {
            if !config_path.exists() {
                println!("# {} not found; showing defaults", config_path.display());
            }
            print!("{}", config.to_toml()?);
        }
    }
    Ok(SUCCESS)
}

fn init(args: ConfigInitArgs, config_path: &Path) -> CliResult<i32> {
    if config_path.exists() && !args.force {
        return Err(CliError::new(
            USAGE,
            format!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            ),
        ));
    }
    Config::default().write(config_path)?;
    println!("wrote {}", config_path.display());
    Ok(SUCCESS)
}
