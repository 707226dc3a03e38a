use std::io::Write;
use std::thread;
use std::time::Duration;

use chronoamp_frame::{CHANNEL_COUNT, FIELD_COUNT};
use chronoamp_session::{AcquisitionParameters, DeviceListener};
use tracing::info;

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let handshake_timeout = parse_duration(&args.handshake_timeout)?;
    let interval = args.interval.as_deref().map(parse_duration).transpose()?;

    let listener =
        DeviceListener::bind(args.bind.as_str()).map_err(|err| session_error("bind failed", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| session_error("bind failed", err))?;
    announce(format, "listening", &addr.to_string());

    let mut session = listener
        .accept(handshake_timeout)
        .map_err(|err| session_error("handshake failed", err))?;
    let params = session.params().clone();
    let interval = interval
        .unwrap_or_else(|| Duration::from_millis(u64::from(params.sample_interval.max(1))));

    for sample in 0..args.records {
        let fields = synthetic_fields(&params, sample);
        session
            .send_measurement(&fields)
            .map_err(|err| session_error("send failed", err))?;
        thread::sleep(interval);
    }
    session
        .send_stop()
        .map_err(|err| session_error("send failed", err))?;

    info!(records = args.records, "simulation finished");
    announce(format, "finished", &args.records.to_string());
    Ok(SUCCESS)
}

fn announce(format: OutputFormat, event: &str, value: &str) {
    let mut out = std::io::stdout();
    let _ = match format {
        OutputFormat::Json => writeln!(
            out,
            "{}",
            serde_json::json!({ "event": event, "value": value })
        ),
        _ => writeln!(out, "{event} {value}"),
    };
    let _ = out.flush();
}

/// One line of a three-phase potential-step run: quiet time at `pre_stepV`,
/// then `v1` for `t1`, then `v2` for `t2`. After each step the current
/// decays with the inverse square root of the time since the step.
fn synthetic_fields(params: &AcquisitionParameters, sample: u32) -> [f64; FIELD_COUNT] {
    let elapsed_ms = u64::from(sample) * u64::from(params.sample_interval.max(1));
    let quiet = u64::from(params.quiet_time);
    let step1_end = quiet + u64::from(params.t1);

    let mut fields = [0.0; FIELD_COUNT];
    for channel in 0..CHANNEL_COUNT {
        let (bias, previous, since_step_ms) = if elapsed_ms < quiet {
            (params.pre_step_v[channel], params.pre_step_v[channel], elapsed_ms)
        } else if elapsed_ms < step1_end {
            (params.v1[channel], params.pre_step_v[channel], elapsed_ms - quiet)
        } else {
            (params.v2[channel], params.v1[channel], elapsed_ms - step1_end)
        };

        let gain = f64::from(params.gain[channel].max(1));
        let step = f64::from(bias - previous);
        let since_step_s = since_step_ms as f64 / 1000.0;
        let current = step * gain / 100.0 / (since_step_s + 0.01).sqrt() + f64::from(bias) / 1000.0;

        let base = channel * 3;
        fields[base] = f64::from(bias);
        fields[base + 1] = elapsed_ms as f64;
        fields[base + 2] = (current * 1000.0).round() / 1000.0;
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AcquisitionParameters {
        AcquisitionParameters {
            sample_interval: 100,
            pre_step_v: [0, 0, 0, 0],
            v1: [100, 200, -100, 0],
            v2: [0, 0, 0, 0],
            quiet_time: 1000,
            t1: 1000,
            t2: 1000,
            ..AcquisitionParameters::default()
        }
    }

    #[test]
    fn quiet_phase_holds_pre_step_bias() {
        let fields = synthetic_fields(&params(), 3);
        assert_eq!(fields[0], 0.0);
        assert_eq!(fields[1], 300.0);
        assert_eq!(fields[2], 0.0);
    }

    #[test]
    fn step_produces_decaying_current() {
        let p = params();
        let first = synthetic_fields(&p, 10);
        let later = synthetic_fields(&p, 15);

        assert_eq!(first[0], 100.0);
        assert_eq!(first[3], 200.0);
        assert!(first[2] > later[2]);
        assert!(later[2] > 0.0);
        // Negative step, negative transient.
        assert!(first[8] < 0.0);
        // No step on channel 4.
        assert_eq!(first[11], 0.0);
    }

    #[test]
    fn every_channel_shares_the_clock() {
        let fields = synthetic_fields(&params(), 25);
        assert_eq!(fields[1], 2500.0);
        assert_eq!(fields[4], 2500.0);
        assert_eq!(fields[7], 2500.0);
        assert_eq!(fields[10], 2500.0);
        assert_eq!(fields[0], 0.0);
    }
}
