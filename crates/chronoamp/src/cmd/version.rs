use chronoamp_frame::{CURRENT_SCALE, DEFAULT_SENTINEL, FIELD_COUNT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("chronoamp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: chronoamp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "wire: {FIELD_COUNT} fields per line, currents / {CURRENT_SCALE}, sentinel {DEFAULT_SENTINEL:?}"
    );

    Ok(SUCCESS)
}
