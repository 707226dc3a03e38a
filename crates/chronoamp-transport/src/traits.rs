use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use tracing::debug;

use crate::error::Result;

/// A connected device stream: implements Read + Write.
///
/// This is the fundamental I/O type returned by [`crate::connect`]. The
/// acquisition loop owns it exclusively for the lifetime of a session.
pub struct DeviceStream {
    inner: TcpStream,
}

impl Read for DeviceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for DeviceStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl DeviceStream {
    pub(crate) fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying socket.
    ///
    /// A timed-out read surfaces as `WouldBlock`/`TimedOut`; the frame reader
    /// treats that as an idle iteration rather than a failure.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying socket.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new socket handle).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Address of the connected device.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Close both halves of the connection.
    ///
    /// Closing an already-disconnected socket is not an error.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => {
                debug!("device stream shut down");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStream")
            .field("type", &"tcp")
            .field("peer", &self.inner.peer_addr().ok())
            .finish()
    }
}
