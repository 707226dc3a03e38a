use std::io::{ErrorKind, Write};

use chronoamp_transport::DeviceStream;

use crate::buffer::LINE_TERMINATOR;
use crate::error::{FrameError, Result};
use crate::reader::{transport_to_frame_error, FrameConfig};

/// Writes newline-terminated messages to any `Write` stream.
pub struct LineWriter<T> {
    inner: T,
    buf: Vec<u8>,
}

impl<T: Write> LineWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Send `payload` followed by the line terminator (blocking).
    ///
    /// A terminator is appended unless the payload already ends with one.
    pub fn send_line(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        self.buf.extend_from_slice(payload);
        if self.buf.last() != Some(&LINE_TERMINATOR) {
            self.buf.push(LINE_TERMINATOR);
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineWriter<DeviceStream> {
    /// Create a line writer for `DeviceStream` and apply write timeout from config.
    pub fn with_config_device(inner: DeviceStream, config: &FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::new(inner))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn appends_terminator() {
        let mut writer = LineWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_line(br#"{"t1":1000}"#).unwrap();
        writer.send_line(b"second\n").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"{\"t1\":1000}\nsecond\n");
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = LineWriter::new(OneByteWriter::default());
        writer.send_line(b"abc").unwrap();
        assert_eq!(writer.get_ref().bytes, b"abc\n");
    }

    #[test]
    fn zero_length_write_is_connection_closed() {
        let mut writer = LineWriter::new(ClosedWriter);
        assert!(matches!(
            writer.send_line(b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn write_error_propagates() {
        let mut writer = LineWriter::new(BrokenWriter);
        let err = writer.send_line(b"x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[derive(Default)]
    struct OneByteWriter {
        bytes: Vec<u8>,
        interrupted: bool,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.bytes.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
