use std::fmt;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::DeviceStream;

/// Default upper bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Host/port identifying the device. No discovery, no multiplexing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Connect to the device (blocking).
///
/// Every address the host resolves to is tried in order with `timeout`; the
/// first successful connection wins. There is no retry beyond that: a failure
/// here aborts the session.
pub fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<DeviceStream> {
    let addrs: Vec<_> = (endpoint.host.as_str(), endpoint.port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            endpoint: endpoint.clone(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            endpoint: endpoint.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            ),
        });
    }

    let mut last_err = None;
    for addr in addrs {
        debug!(%addr, ?timeout, "attempting connection");
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                // Lines are small and latency matters more than batching.
                stream.set_nodelay(true)?;
                info!(%endpoint, %addr, "connected to device");
                return Ok(DeviceStream::from_tcp(stream));
            }
            Err(err) => {
                debug!(%addr, error = %err, "connection attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        endpoint: endpoint.clone(),
        source: last_err.unwrap_or_else(|| std::io::Error::other("no address attempted")),
    })
}

/// Listening side of the transport, used to stand in for a device.
pub struct StreamListener {
    listener: TcpListener,
}

impl StreamListener {
    /// Bind and listen on `addr`.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(addr = ?listener.local_addr().ok(), "listening for connections");
        Ok(Self { listener })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<DeviceStream> {
        let (stream, addr) = self.listener.accept()?;
        debug!(%addr, "accepted connection");
        Ok(DeviceStream::from_tcp(stream))
    }

    /// Address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}
