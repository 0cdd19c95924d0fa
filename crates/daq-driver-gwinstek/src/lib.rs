//! GW Instek GPM-8213 power analyzer driver.
//!
//! The instrument speaks a line-oriented SCPI dialect over a raw TCP socket
//! (port 23 by default). Commands end in `\r\n`; queries answer with one line.
//!
//! # Architecture
//!
//! ```text
//! SessionConfig ──validate──► InstrumentSession ──► FramedConnection ──► Box<dyn Link>
//!                                   │                                        │
//!                             DeviceConfig                          TcpStream │ MockGpm
//!                         (validated transitions)
//! ```
//!
//! - [`DeviceConfig`] is the local mirror of the instrument state. Every setter
//!   returns a [`Transition`] (next state plus the commands producing it), so
//!   validation happens before the first byte is sent and the mirror only
//!   changes after every command was written.
//! - [`InstrumentSession`] owns the connection and applies transitions.
//! - [`parse_reading`] turns a `:NUM:NORM:VALUE?` reply into a [`Reading`]
//!   that records whether every active item got a value.
//!
//! # Example
//!
//! ```rust,no_run
//! use daq_driver_gwinstek::{InstrumentSession, MeasurementVariable, Mode, SessionConfig};
//!
//! # fn main() -> daq_driver_gwinstek::Result<()> {
//! let mut config = SessionConfig::new("192.168.1.50");
//! config.variables = MeasurementVariable::parse_list(&["U", "I", "P", "WH"])?;
//! config.mode = Mode::Ac;
//!
//! let mut session = InstrumentSession::open(&config)?;
//! for (name, value) in session.trigger_and_read()?.iter() {
//!     println!("{name} = {value}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod reading;
pub mod session;
pub mod transport;
pub mod variable;

pub use config::SessionConfig;
pub use device::{
    pattern_variables, CrestFactor, DeviceConfig, InputRange, Mode, Transition,
    VariableSelection, MAX_PATTERN, MAX_VARIABLES,
};
pub use error::{GpmError, RangeAxis, Result};
pub use mock::MockGpm;
pub use reading::{parse_reading, Completeness, PartialReason, Reading};
pub use session::InstrumentSession;
pub use transport::{Endpoint, Link};
pub use variable::{MeasurementVariable, VariableCatalog, CATALOG};
