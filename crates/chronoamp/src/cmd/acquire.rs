use std::path::Path;
use std::time::Instant;

use chronoamp_session::{
    handoff_queue, spawn_session, CancellationSignal, ConsumerLoop, EndReason,
};
use tracing::{info, warn};

use crate::cmd::{parse_duration, AcquireArgs};
use crate::config::Config;
use crate::exit::{session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_summary, OutputFormat, RecordPrinter};

pub fn run(args: AcquireArgs, config_path: &Path, format: OutputFormat) -> CliResult<i32> {
    let poll_interval = parse_duration(&args.poll_interval)?;
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|limit| Instant::now() + limit);

    let mut config = Config::load_or_init(config_path)?;
    let overridden = args.host.is_some() || args.port.is_some() || args.output_dir.is_some();
    if let Some(host) = args.host {
        config.device.host = host;
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }
    if let Some(dir) = args.output_dir {
        config.output.dir = dir;
    }

    let cancel = CancellationSignal::new();
    install_ctrlc_handler(cancel.clone())?;

    let archive = config.archive_source(config_path, overridden)?;
    let options = config.session_options(Some(archive));
    info!(endpoint = %options.endpoint, dir = %options.output_dir.display(), "starting session");

    let (sender, receiver) = handoff_queue();
    let handle = spawn_session(options, config.parameters.clone(), sender, cancel.clone())
        .map_err(|err| session_error("failed to start acquisition", err))?;

    // The queue closes once the acquisition thread is done, whatever the
    // reason; keep draining until then so no record is left behind.
    let mut consumer = ConsumerLoop::new(receiver, RecordPrinter::stdout(format));
    consumer.run_until(poll_interval, || {
        if let Some(deadline) = deadline {
            if !cancel.is_cancelled() && Instant::now() >= deadline {
                info!("duration elapsed, stopping session");
                cancel.cancel();
            }
        }
        false
    });
    consumer.sink_mut().finish();

    let summary = handle
        .join()
        .map_err(|err| session_error("acquisition failed", err))?;

    let (series, _) = consumer.into_parts();
    print_summary(&mut std::io::stdout(), &summary, &series, format);

    match summary.end_reason {
        EndReason::IoError(_) => {
            warn!("session ended on an I/O error");
            Ok(FAILURE)
        }
        _ => Ok(SUCCESS),
    }
}

fn install_ctrlc_handler(cancel: CancellationSignal) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
