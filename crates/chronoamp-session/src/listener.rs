//! Device side of the protocol, for bench testing without hardware.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use chronoamp_frame::{
    FrameConfig, FrameReader, LineWriter, CURRENT_FIELDS, CURRENT_SCALE, DEFAULT_SENTINEL,
    FIELD_COUNT,
};
use chronoamp_transport::{DeviceStream, StreamListener};
use tracing::{debug, info};

use crate::error::Result;
use crate::handshake::{receive_handshake, AcquisitionParameters};

/// Accepts acquisition clients the way the instrument does.
pub struct DeviceListener {
    inner: StreamListener,
}

impl DeviceListener {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        Ok(Self {
            inner: StreamListener::bind(addr)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept one client and wait up to `handshake_timeout` for its
    /// parameters.
    pub fn accept(&self, handshake_timeout: Duration) -> Result<DeviceSession> {
        let stream = self.inner.accept()?;
        let peer = stream.peer_addr().ok();

        let config = FrameConfig {
            read_timeout: Some(Duration::from_millis(100)),
            ..FrameConfig::default()
        };
        let writer = LineWriter::new(stream.try_clone()?);
        let mut reader = FrameReader::with_config_device(stream, config)?;
        let params = receive_handshake(&mut reader, handshake_timeout)?;
        info!(?peer, sample_interval = params.sample_interval, "client handshake received");

        Ok(DeviceSession { params, writer })
    }
}

/// One accepted client, past the handshake.
pub struct DeviceSession {
    params: AcquisitionParameters,
    writer: LineWriter<DeviceStream>,
}

impl DeviceSession {
    /// Parameters the client sent.
    pub fn params(&self) -> &AcquisitionParameters {
        &self.params
    }

    pub fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.send_line(line.as_bytes())?;
        Ok(())
    }

    /// Send one measurement line. `fields` carries currents in display
    /// units; they go out in raw sensor units.
    pub fn send_measurement(&mut self, fields: &[f64; FIELD_COUNT]) -> Result<()> {
        let line = fields
            .iter()
            .enumerate()
            .map(|(index, value)| {
                if CURRENT_FIELDS.contains(&index) {
                    format!("{}", (value * CURRENT_SCALE).round())
                } else {
                    format!("{value}")
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        debug!(%line, "sending measurement");
        self.send_line(&line)
    }

    /// Send the end-of-stream sentinel.
    pub fn send_stop(&mut self) -> Result<()> {
        self.send_line(DEFAULT_SENTINEL)
    }
}
