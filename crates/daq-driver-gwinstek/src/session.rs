//! One exclusively owned connection to a GPM-8213.
//!
//! # Lifecycle
//!
//! [`InstrumentSession::open`] performs, in order: connect → `*IDN?` →
//! item list or preset → input mode → input range. If any step fails the
//! partially built session is dropped, which releases the instrument.
//!
//! Every exchange is a full blocking round trip. A query that times out, or
//! any socket error, closes the connection; later calls fail with
//! [`GpmError::Connection`] until a new session is opened. Validation errors
//! never touch the connection.
//!
//! Teardown (explicit [`InstrumentSession::close`] or `Drop`) sends
//! `:COMM:REM 0` to hand the front panel back, then shuts the socket down.
//! If the peer is already gone the write error is only logged.
//!
//! # Example
//!
//! ```rust,no_run
//! use daq_driver_gwinstek::{InstrumentSession, SessionConfig};
//!
//! # fn main() -> daq_driver_gwinstek::Result<()> {
//! let mut session = InstrumentSession::open(&SessionConfig::new("192.168.1.50"))?;
//! let reading = session.trigger_and_read()?;
//! println!("P = {:?} W", reading.get("P"));
//! session.close();
//! # Ok(())
//! # }
//! ```

use crate::config::SessionConfig;
use crate::device::{DeviceConfig, InputRange, Mode, Transition, VariableSelection};
use crate::error::{GpmError, Result};
use crate::mock::MockGpm;
use crate::protocol::{self, DEFAULT_BUFFER_EXPONENT};
use crate::reading::{parse_reading, Completeness, Reading};
use crate::transport::{Endpoint, FrameError, FramedConnection, Link};
use crate::variable::MeasurementVariable;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timeout used by [`InstrumentSession::drain_buffer`].
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest accepted receive buffer exponent (2^20 bytes).
const MAX_BUFFER_EXPONENT: u32 = 20;

/// Session with one instrument.
pub struct InstrumentSession {
    endpoint: Endpoint,
    timeout: Duration,
    connection: Option<FramedConnection>,
    identity: String,
    config: DeviceConfig,
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("endpoint", &self.endpoint)
            .field("identity", &self.identity)
            .field("connected", &self.is_connected())
            .field("config", &self.config)
            .finish()
    }
}

impl InstrumentSession {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Open a session and bring the instrument to `config`.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint();

        let mut session = if config.mock {
            info!("Opening mock GPM session for {}", endpoint);
            Self::with_link(Box::new(MockGpm::new()), endpoint, config.timeout())?
        } else {
            Self::connect(endpoint, config.timeout())?
        };

        session.configure(&config.selection(), config.mode, config.input_range()?)?;
        Ok(session)
    }

    /// Connect over TCP and identify the instrument.
    ///
    /// The mirrored configuration starts empty; call [`Self::configure`] or
    /// the individual setters before reading values.
    pub fn connect(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        info!("Connecting to GPM at {}", endpoint);
        let stream = endpoint.connect(timeout).map_err(|e| {
            error!("Unable to open link with {}: {}", endpoint, e);
            GpmError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::with_link(Box::new(stream), endpoint, timeout)
    }

    /// Identify the instrument over an already open link.
    pub fn with_link(link: Box<dyn Link>, endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let connection =
            FramedConnection::new(link, timeout).map_err(|e| GpmError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let mut session = Self {
            endpoint,
            timeout,
            connection: Some(connection),
            identity: String::new(),
            config: DeviceConfig::default(),
        };
        session.identify()?;
        Ok(session)
    }

    fn identify(&mut self) -> Result<()> {
        let reply = self.query(protocol::IDENTIFY)?;
        self.identity = String::from_utf8_lossy(&reply).trim().to_string();
        info!("Connected to {} at {}", self.identity, self.endpoint);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identity reported at connect.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Host and port.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Normal read timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// False once the connection was closed by teardown or an I/O error.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Mirrored instrument configuration.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Active items in reply order.
    pub fn variables(&self) -> &[MeasurementVariable] {
        self.config.variables()
    }

    /// 0 for a custom list, 1-4 for a preset.
    pub fn pattern(&self) -> u8 {
        self.config.pattern()
    }

    /// Input mode, `None` before [`configure`](Self::configure) or
    /// [`set_mode`](Self::set_mode) sent one.
    pub fn mode(&self) -> Option<Mode> {
        self.config.mode()
    }

    /// Input range, `None` before one was sent.
    pub fn range(&self) -> Option<InputRange> {
        self.config.range()
    }

    /// `identity,host,port`, used to label samples.
    pub fn label(&self) -> String {
        format!(
            "{},{},{}",
            self.identity,
            self.endpoint.host(),
            self.endpoint.port()
        )
    }

    // =========================================================================
    // Protocol primitives
    // =========================================================================

    fn connection(&mut self) -> Result<&mut FramedConnection> {
        let endpoint = &self.endpoint;
        self.connection.as_mut().ok_or_else(|| GpmError::Connection {
            endpoint: endpoint.to_string(),
            reason: "session is closed".into(),
        })
    }

    /// Write `text` as-is; the caller supplies the `\r\n` terminator.
    pub fn send_command(&mut self, text: &str) -> Result<()> {
        if !text.is_ascii() {
            return Err(GpmError::InvalidCommand(text.to_string()));
        }
        debug!("GPM {} write: {:?}", self.endpoint, text.trim_end());

        let written = self.connection()?.write_all(text.as_bytes());
        if let Err(e) = written {
            error!("Write to {} failed: {}", self.endpoint, e);
            self.disconnect();
            return Err(GpmError::Connection {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Send `text` and wait for one reply line (512-byte buffer).
    pub fn query(&mut self, text: &str) -> Result<Vec<u8>> {
        self.query_with_capacity(text, DEFAULT_BUFFER_EXPONENT)
    }

    /// Send `text` and wait for one reply of at most `2^buffer_exponent` bytes.
    pub fn query_with_capacity(&mut self, text: &str, buffer_exponent: u32) -> Result<Vec<u8>> {
        let stale = self.connection()?.discard_residual();
        if stale > 0 {
            warn!("Discarded {} stale bytes from {} before query", stale, self.endpoint);
        }
        self.send_command(text)?;
        self.read_reply(text, buffer_exponent)
    }

    fn read_reply(&mut self, command: &str, buffer_exponent: u32) -> Result<Vec<u8>> {
        let capacity = 1usize << buffer_exponent.min(MAX_BUFFER_EXPONENT);
        let outcome = self.connection()?.read_frame(capacity);

        match outcome {
            Ok(reply) => {
                debug!("GPM {} reply: {:?}", self.endpoint, String::from_utf8_lossy(&reply));
                Ok(reply)
            }
            Err(FrameError::Overflow { capacity }) => {
                warn!("Reply from {} overflowed {} bytes", self.endpoint, capacity);
                Err(GpmError::ResponseOverflow { capacity })
            }
            Err(FrameError::TimedOut) => {
                error!("{} doesn't answer to {:?}", self.endpoint, command.trim_end());
                self.disconnect();
                Err(GpmError::Timeout {
                    command: command.trim_end().to_string(),
                    timeout: self.timeout,
                })
            }
            Err(FrameError::Closed) => {
                error!("{} closed the connection", self.endpoint);
                self.disconnect();
                Err(GpmError::Connection {
                    endpoint: self.endpoint.to_string(),
                    reason: "connection closed by instrument".into(),
                })
            }
            Err(FrameError::Io(e)) => {
                error!("Read from {} failed: {}", self.endpoint, e);
                self.disconnect();
                Err(GpmError::Connection {
                    endpoint: self.endpoint.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Flush unread bytes, waiting at most [`DRAIN_TIMEOUT`] for more.
    pub fn drain_buffer(&mut self) -> Result<Option<Vec<u8>>> {
        self.drain_buffer_with(DRAIN_TIMEOUT)
    }

    /// Flush unread bytes, waiting at most `short_timeout` for more.
    ///
    /// Returns `None` when nothing was pending.
    pub fn drain_buffer_with(&mut self, short_timeout: Duration) -> Result<Option<Vec<u8>>> {
        let drained = self.connection()?.drain(short_timeout);
        match drained {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => {
                warn!("Drained {} unread bytes from {}", bytes.len(), self.endpoint);
                Ok(Some(bytes))
            }
            Err(e) => {
                error!("Drain of {} failed: {}", self.endpoint, e);
                self.disconnect();
                Err(GpmError::Connection {
                    endpoint: self.endpoint.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    fn apply(&mut self, transition: Transition) -> Result<()> {
        for command in &transition.commands {
            self.send_command(command)?;
        }
        self.config = transition.next;
        Ok(())
    }

    /// Replace the item list and rewrite every slot.
    pub fn set_variables(&mut self, variables: Vec<MeasurementVariable>) -> Result<()> {
        let transition = self.config.set_variables(variables)?;
        self.apply(transition)
    }

    /// Append one item, writing only its slot.
    pub fn add_variable(&mut self, variable: MeasurementVariable) -> Result<()> {
        let transition = self.config.add_variable(variable)?;
        self.apply(transition)
    }

    /// Append several items and rewrite the whole list.
    pub fn add_variables(&mut self, variables: &[MeasurementVariable]) -> Result<()> {
        let transition = self.config.add_variables(variables)?;
        self.apply(transition)
    }

    /// Select preset 1-4.
    pub fn set_pattern(&mut self, pattern: u8) -> Result<()> {
        let transition = self.config.set_pattern(pattern)?;
        self.apply(transition)
    }

    /// Apply a custom list or a preset.
    pub fn select(&mut self, selection: &VariableSelection) -> Result<()> {
        let transition = self.config.select(selection)?;
        self.apply(transition)
    }

    /// Set the input mode.
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let transition = self.config.set_mode(mode);
        self.apply(transition)
    }

    /// Set voltage and current range for a crest factor.
    pub fn set_range(&mut self, current: f64, voltage: f64, crest_factor: u8) -> Result<()> {
        let transition = self.config.set_range(current, voltage, crest_factor)?;
        self.apply(transition)
    }

    /// Apply item selection, mode and range, in that order.
    ///
    /// The selection is validated before anything is sent.
    pub fn configure(
        &mut self,
        selection: &VariableSelection,
        mode: Mode,
        range: InputRange,
    ) -> Result<()> {
        let transition = self.config.select(selection)?;
        self.apply(transition)?;
        let transition = self.config.set_mode(mode);
        self.apply(transition)?;
        let transition = self.config.set_input_range(range);
        self.apply(transition)
    }

    /// Alias of [`Self::configure`] for an already running session.
    pub fn reconfigure(
        &mut self,
        selection: &VariableSelection,
        mode: Mode,
        range: InputRange,
    ) -> Result<()> {
        self.configure(selection, mode, range)
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Ask for values without waiting for the reply.
    pub fn trigger(&mut self) -> Result<()> {
        self.send_command(protocol::VALUE_QUERY)
    }

    /// Read and parse the reply to an earlier [`Self::trigger`].
    pub fn collect(&mut self) -> Result<Reading> {
        let raw = self.read_reply(protocol::VALUE_QUERY, DEFAULT_BUFFER_EXPONENT)?;
        Ok(self.parse_reading(&raw))
    }

    /// Query values and parse them.
    pub fn trigger_and_read(&mut self) -> Result<Reading> {
        let raw = self.query(protocol::VALUE_QUERY)?;
        Ok(self.parse_reading(&raw))
    }

    /// Match a raw reply against the active items.
    pub fn parse_reading(&self, raw: &[u8]) -> Reading {
        let reading = parse_reading(raw, self.config.variables());
        if let Completeness::Partial(reason) = reading.completeness() {
            warn!(
                "Partial reading from {} ({} of {} values): {}",
                self.endpoint,
                reading.len(),
                self.config.variables().len(),
                reason
            );
        }
        reading
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.write_all(protocol::RELEASE_REMOTE.as_bytes()) {
                debug!("Release of {} skipped, peer already gone: {}", self.endpoint, e);
            }
            connection.shutdown();
        }
    }

    /// Release remote control and close the connection.
    pub fn close(mut self) {
        if self.is_connected() {
            info!("Closing GPM session with {}", self.endpoint);
        }
        self.disconnect();
    }
}

impl Drop for InstrumentSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}
