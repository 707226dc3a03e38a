use std::io::{Read, Write};
use std::time::{Duration, Instant};

use chronoamp_frame::{FrameReader, LineWriter, Termination, CHANNEL_COUNT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SessionError};

/// Acquisition parameters sent to the device once, right after connecting.
///
/// Field names on the wire (and in the configuration file) follow the
/// device firmware: `pre_stepV`, `quietTime`, ... Per-channel arrays are
/// fixed at [`CHANNEL_COUNT`] entries. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionParameters {
    /// Milliseconds between samples.
    pub sample_interval: u32,
    /// Gain-range selector.
    pub range: i32,
    /// Bias held during the quiet time, per channel (mV).
    #[serde(rename = "pre_stepV")]
    pub pre_step_v: [i32; CHANNEL_COUNT],
    /// First potential step, per channel (mV).
    pub v1: [i32; CHANNEL_COUNT],
    /// Second potential step, per channel (mV).
    pub v2: [i32; CHANNEL_COUNT],
    /// Per-channel gain selector.
    pub gain: [i32; CHANNEL_COUNT],
    /// Milliseconds at `pre_stepV` before the first step.
    #[serde(rename = "quietTime")]
    pub quiet_time: u32,
    /// Duration of the first step (ms).
    pub t1: u32,
    /// Duration of the second step (ms).
    pub t2: u32,
}

impl Default for AcquisitionParameters {
    fn default() -> Self {
        Self {
            sample_interval: 100,
            range: 6,
            pre_step_v: [0; CHANNEL_COUNT],
            v1: [0; CHANNEL_COUNT],
            v2: [0; CHANNEL_COUNT],
            gain: [5; CHANNEL_COUNT],
            quiet_time: 1000,
            t1: 1000,
            t2: 1000,
        }
    }
}

impl AcquisitionParameters {
    /// Total programmed run time: quiet time plus both steps.
    pub fn run_time(&self) -> Duration {
        Duration::from_millis(
            u64::from(self.quiet_time) + u64::from(self.t1) + u64::from(self.t2),
        )
    }
}

/// Serialize parameters to the single-line handshake message.
///
/// Compact JSON with the terminating newline already appended.
pub fn encode_handshake(params: &AcquisitionParameters) -> Result<Vec<u8>> {
    let mut payload = serde_json::to_vec(params)?;
    payload.push(b'\n');
    Ok(payload)
}

/// Send the handshake. Any failure here aborts the session.
pub fn send_handshake<W: Write>(
    writer: &mut LineWriter<W>,
    params: &AcquisitionParameters,
) -> Result<()> {
    let payload = encode_handshake(params)?;
    writer.send_line(&payload)?;
    info!(
        sample_interval = params.sample_interval,
        range = params.range,
        bytes = payload.len(),
        "sent acquisition parameters"
    );
    Ok(())
}

/// Device side: wait for the handshake line and parse it.
pub fn receive_handshake<R: Read>(
    reader: &mut FrameReader<R>,
    timeout: Duration,
) -> Result<AcquisitionParameters> {
    let deadline = Instant::now() + timeout;
    loop {
        if Instant::now() >= deadline {
            return Err(SessionError::Timeout(timeout));
        }

        let batch = reader.read_batch()?;
        if let Some(line) = batch.frames.into_iter().find(|frame| !frame.is_empty()) {
            debug!(bytes = line.len(), "received handshake line");
            let params: AcquisitionParameters = serde_json::from_slice(line.as_bytes())?;
            return Ok(params);
        }

        match batch.termination {
            Some(Termination::PeerClosed) => {
                return Err(SessionError::Disconnected(
                    "connection closed during handshake".to_string(),
                ));
            }
            Some(Termination::Sentinel) => {
                return Err(SessionError::HandshakeFailed(
                    "sentinel received instead of parameters".to_string(),
                ));
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn encodes_wire_field_names_in_order() {
        let payload = encode_handshake(&AcquisitionParameters::default()).unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            "{\"sample_interval\":100,\"range\":6,\"pre_stepV\":[0,0,0,0],\
             \"v1\":[0,0,0,0],\"v2\":[0,0,0,0],\"gain\":[5,5,5,5],\
             \"quietTime\":1000,\"t1\":1000,\"t2\":1000}\n"
        );
    }

    #[test]
    fn send_writes_exactly_one_line() {
        let params = AcquisitionParameters {
            v1: [-200, -100, 100, 200],
            ..AcquisitionParameters::default()
        };
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        send_handshake(&mut writer, &params).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire.iter().filter(|&&b| b == b'\n').count(), 1);
        assert!(wire.ends_with(b"}\n"));

        let decoded: AcquisitionParameters = serde_json::from_slice(&wire).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn receive_parses_handshake_line() {
        let params = AcquisitionParameters {
            sample_interval: 50,
            gain: [1, 2, 3, 4],
            ..AcquisitionParameters::default()
        };
        let wire = encode_handshake(&params).unwrap();
        let mut reader = FrameReader::new(Cursor::new(wire));

        let received = receive_handshake(&mut reader, Duration::from_secs(1)).unwrap();
        assert_eq!(received, params);
    }

    #[test]
    fn receive_rejects_closed_connection() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = receive_handshake(&mut reader, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
    }

    #[test]
    fn receive_rejects_wrong_channel_count() {
        let wire = b"{\"sample_interval\":100,\"range\":6,\"pre_stepV\":[0,0,0],\
            \"v1\":[0,0,0,0],\"v2\":[0,0,0,0],\"gain\":[5,5,5,5],\
            \"quietTime\":1000,\"t1\":1000,\"t2\":1000}\n"
            .to_vec();
        let mut reader = FrameReader::new(Cursor::new(wire));
        let err = receive_handshake(&mut reader, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SessionError::Json(_)));
    }

    #[test]
    fn run_time_sums_phases() {
        let params = AcquisitionParameters {
            quiet_time: 500,
            t1: 2000,
            t2: 3000,
            ..AcquisitionParameters::default()
        };
        assert_eq!(params.run_time(), Duration::from_millis(5500));
    }
}
