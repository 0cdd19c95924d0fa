//! Blocking TCP transport with line framing.
//!
//! The GPM protocol has no message framing beyond the line terminator, and a
//! single `read()` may return half a reply or a reply plus the start of the
//! next one. [`FramedConnection`] keeps the bytes past the last delimiter in a
//! residual buffer and hands out one complete line per [`FramedConnection::read_frame`].

use crate::protocol::REPLY_DELIMITER;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Byte stream to an instrument.
///
/// Implemented for [`TcpStream`] and for the in-memory mock instrument.
pub trait Link: Read + Write + Send {
    /// Bound for the next blocking read. `None` blocks forever.
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Close both directions.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Link for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Host and port of one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint; nothing is resolved yet.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve and connect, trying every resolved address in turn.
    ///
    /// The stream is configured with `timeout` for reads and writes and with
    /// Nagle disabled. A stream that fails configuration is dropped (and so
    /// closed) before the error is returned.
    pub fn connect(&self, timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (self.host.as_str(), self.port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Why a frame could not be read.
#[derive(Debug)]
pub enum FrameError {
    /// No delimiter before the deadline
    TimedOut,
    /// Peer closed the stream
    Closed,
    /// More than `capacity` bytes without a delimiter; the partial frame is dropped
    Overflow {
        /// Receive buffer size in bytes
        capacity: usize,
    },
    /// Any other socket error
    Io(io::Error),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        FrameError::Io(e)
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

const READ_CHUNK: usize = 256;

/// Line-framed connection with a residual-bytes buffer.
pub struct FramedConnection {
    link: Box<dyn Link>,
    residual: Vec<u8>,
    timeout: Duration,
    /// Set after an overflow cut a line short; bytes up to the next delimiter
    /// belong to that line.
    skipping_to_delimiter: bool,
}

impl FramedConnection {
    /// Wrap a link; `timeout` bounds every frame read.
    pub fn new(mut link: Box<dyn Link>, timeout: Duration) -> io::Result<Self> {
        link.set_read_timeout(Some(timeout))?;
        Ok(Self {
            link,
            residual: Vec::new(),
            timeout,
            skipping_to_delimiter: false,
        })
    }

    /// Normal read timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write every byte and flush.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.link.write_all(bytes)?;
        self.link.flush()
    }

    /// Drop buffered bytes left over from earlier exchanges.
    ///
    /// Returns the number of bytes discarded.
    pub fn discard_residual(&mut self) -> usize {
        let stale = self.residual.len();
        self.residual.clear();
        stale
    }

    /// Read one line, without its `\r\n`.
    ///
    /// A line (delimiter included) longer than `capacity` bytes is discarded
    /// and reported as [`FrameError::Overflow`]. When the overflow is detected
    /// before the delimiter arrives, the rest of that line is skipped by the
    /// following reads.
    pub fn read_frame(&mut self, capacity: usize) -> Result<Vec<u8>, FrameError> {
        let deadline = Instant::now() + self.timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if self.skipping_to_delimiter {
                match self.residual.iter().position(|b| *b == REPLY_DELIMITER) {
                    Some(pos) => {
                        self.residual.drain(..=pos);
                        self.skipping_to_delimiter = false;
                    }
                    None => self.residual.clear(),
                }
            }

            if !self.skipping_to_delimiter {
                if let Some(pos) = self.residual.iter().position(|b| *b == REPLY_DELIMITER) {
                    let mut frame: Vec<u8> = self.residual.drain(..=pos).collect();
                    if frame.len() > capacity {
                        return Err(FrameError::Overflow { capacity });
                    }
                    frame.pop();
                    if frame.last() == Some(&b'\r') {
                        frame.pop();
                    }
                    return Ok(frame);
                }

                if self.residual.len() >= capacity {
                    self.residual.clear();
                    self.skipping_to_delimiter = true;
                    return Err(FrameError::Overflow { capacity });
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FrameError::TimedOut);
            }
            self.link.set_read_timeout(Some(remaining))?;

            match self.link.read(&mut chunk) {
                Ok(0) => return Err(FrameError::Closed),
                Ok(n) => self.residual.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return Err(FrameError::TimedOut),
                Err(e) => return Err(FrameError::Io(e)),
            }
        }
    }

    /// Collect whatever is buffered or arrives within `short_timeout`.
    ///
    /// Timeouts and end-of-stream end the drain without error. The normal
    /// timeout is restored before returning, whatever the outcome.
    pub fn drain(&mut self, short_timeout: Duration) -> io::Result<Vec<u8>> {
        let mut drained = std::mem::take(&mut self.residual);
        self.skipping_to_delimiter = false;
        let mut chunk = [0u8; READ_CHUNK];

        let outcome = self.link.set_read_timeout(Some(short_timeout)).and_then(|()| loop {
            match self.link.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => drained.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => break Ok(()),
                Err(e) => break Err(e),
            }
        });
        let restored = self.link.set_read_timeout(Some(self.timeout));

        outcome?;
        restored?;
        Ok(drained)
    }

    /// Force-close the link, ignoring errors.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.link.shutdown() {
            tracing::debug!("shutdown of instrument link failed: {}", e);
        }
    }
}
