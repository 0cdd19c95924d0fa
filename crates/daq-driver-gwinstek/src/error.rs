//! Error type for the GPM session driver.
//!
//! Errors fall into two groups:
//!
//! - **I/O errors** (`Connection`, `Timeout`, `ResponseOverflow`): raised while
//!   talking to the instrument. `Connection` and `Timeout` leave the session
//!   closed; the caller has to open a new one.
//! - **Configuration errors** (`InvalidVariable`, `TooManyVariables`,
//!   `DuplicateVariable`, `InvalidPattern`, `InvalidMode`, `InvalidCrestFactor`,
//!   `InvalidRange`, `InvalidCommand`, `Config`): raised before anything is sent.
//!   The session stays usable and its mirrored state is untouched.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type Result<T> = std::result::Result<T, GpmError>;

/// Which input range axis failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeAxis {
    /// Voltage range (volts)
    Voltage,
    /// Current range (amps)
    Current,
}

impl fmt::Display for RangeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeAxis::Voltage => f.write_str("voltage"),
            RangeAxis::Current => f.write_str("current"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GpmError {
    #[error("Connection error with {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Timeout waiting for a reply to {command:?} (timeout {timeout:?})")]
    Timeout { command: String, timeout: Duration },

    #[error("Reply exceeded the {capacity}-byte receive buffer without a terminator")]
    ResponseOverflow { capacity: usize },

    #[error("Command must be ASCII: {0:?}")]
    InvalidCommand(String),

    #[error("'{0}' is not a variable known to the instrument")]
    InvalidVariable(String),

    #[error("Too many variables: {count} (the instrument accepts at most {max})")]
    TooManyVariables { count: usize, max: usize },

    #[error("Variable '{0}' is already in the measurement list")]
    DuplicateVariable(String),

    #[error("Pattern must be between 1 and 4, got {0}")]
    InvalidPattern(u8),

    #[error("Mode must be 'DC', 'AC' or 'ACDC', got '{0}'")]
    InvalidMode(String),

    #[error("Crest factor must be 3 or 6, got {0}")]
    InvalidCrestFactor(u8),

    #[error("With CF={crest_factor}, {axis} range must be in {legal:?}, got {value}")]
    InvalidRange {
        axis: RangeAxis,
        value: f64,
        crest_factor: u8,
        legal: &'static [f64],
    },

    #[error("Invalid session configuration: {0}")]
    Config(String),
}

impl GpmError {
    /// True for validation failures that leave the session usable.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            GpmError::Connection { .. } | GpmError::Timeout { .. } | GpmError::ResponseOverflow { .. }
        )
    }

    /// True when the error left the session disconnected.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, GpmError::Connection { .. } | GpmError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_configuration_errors() {
        assert!(GpmError::InvalidPattern(0).is_configuration());
        assert!(GpmError::InvalidVariable("X".into()).is_configuration());
        assert!(!GpmError::ResponseOverflow { capacity: 512 }.is_configuration());
    }

    #[test]
    fn io_errors_report_disconnect() {
        let err = GpmError::Timeout {
            command: ":NUM:NORM:VALUE?".into(),
            timeout: Duration::from_secs(2),
        };
        assert!(err.is_disconnect());
        assert!(!err.is_configuration());
        assert!(!GpmError::ResponseOverflow { capacity: 8 }.is_disconnect());
    }

    #[test]
    fn range_error_names_axis_and_legal_set() {
        let err = GpmError::InvalidRange {
            axis: RangeAxis::Voltage,
            value: 600.0,
            crest_factor: 6,
            legal: &[7.5, 15.0],
        };
        let msg = err.to_string();
        assert!(msg.contains("voltage"));
        assert!(msg.contains("CF=6"));
        assert!(msg.contains("7.5"));
    }
}
