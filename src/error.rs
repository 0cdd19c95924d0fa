//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the orchestrator and
//! the CLI. Using the `thiserror` crate, it provides a centralized way to handle the
//! errors that can occur while loading configuration, talking to instruments and
//! writing samples.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type
//!   mismatches in the configuration file or environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine, such as
//!   an unknown sampling mode or a duplicate instrument id. Caught during validation.
//! - **`Instrument`**: Wraps [`GpmError`] from the driver crate. Use
//!   [`DaqError::is_disconnect`] to tell whether the session that raised it is gone.
//! - **`Io`**: Wraps `std::io::Error` for file and terminal output.
//! - **`Serialization`**: Wraps `serde_json` errors when samples are encoded.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types with
//! the `?` operator.

use daq_driver_gwinstek::GpmError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Instrument error: {0}")]
    Instrument(#[from] GpmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaqError {
    /// True when an instrument session was closed by this error.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DaqError::Instrument(err) if err.is_disconnect())
    }
}
