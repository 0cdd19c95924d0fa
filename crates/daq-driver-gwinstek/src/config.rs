//! Typed session configuration.
//!
//! In an application config file each instrument carries its session
//! settings in an `[instruments.config]` table.
//!
//! # Examples
//!
//! ```toml
//! [[instruments]]
//! id = "bench"
//! [instruments.config]
//! host = "192.168.1.50"
//! pattern = 2
//! mode = "AC"
//! current_range = 0.5
//! voltage_range = 300
//! ```
//!
//! A non-empty `variables` list overrides `pattern`.

use crate::device::{pattern_variables, DeviceConfig, InputRange, Mode, VariableSelection, MAX_PATTERN};
use crate::error::{GpmError, Result};
use crate::protocol::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use crate::transport::Endpoint;
use crate::variable::MeasurementVariable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Everything needed to open and configure one session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Instrument host name or IP address (see System > Config > LAN on the front panel)
    pub host: String,

    /// Control port (default: 23)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect and read timeout in milliseconds (default: 2000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Custom item list; overrides `pattern` when non-empty
    #[serde(default)]
    pub variables: Vec<MeasurementVariable>,

    /// Preset pattern 1-4 (default: 4)
    #[serde(default = "default_pattern")]
    pub pattern: u8,

    /// Input mode (default: ACDC)
    #[serde(default)]
    pub mode: Mode,

    /// Current range in amps (default: 10)
    #[serde(default = "default_current_range")]
    pub current_range: f64,

    /// Voltage range in volts (default: 600)
    #[serde(default = "default_voltage_range")]
    pub voltage_range: f64,

    /// Crest factor, 3 or 6 (default: 3)
    #[serde(default = "default_crest_factor")]
    pub crest_factor: u8,

    /// Use the in-memory mock instead of a TCP connection
    #[serde(default)]
    pub mock: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_pattern() -> u8 {
    MAX_PATTERN
}

fn default_current_range() -> f64 {
    10.0
}

fn default_voltage_range() -> f64 {
    600.0
}

fn default_crest_factor() -> u8 {
    3
}

impl SessionConfig {
    /// Defaults for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            variables: Vec::new(),
            pattern: default_pattern(),
            mode: Mode::default(),
            current_range: default_current_range(),
            voltage_range: default_voltage_range(),
            crest_factor: default_crest_factor(),
            mock: false,
        }
    }

    /// Parse from a TOML table.
    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| GpmError::Config(e.to_string()))
    }

    /// Parse and validate in one step.
    pub fn from_toml_validated(value: &toml::Value) -> Result<Self> {
        let config = Self::from_toml(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field without touching the network.
    ///
    /// Returns the same errors the session setters would.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(GpmError::Config("host must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(GpmError::Config("timeout_ms must be greater than 0".into()));
        }
        match self.selection() {
            VariableSelection::Pattern(pattern) => {
                pattern_variables(pattern)?;
            }
            selection @ VariableSelection::Custom(_) => {
                DeviceConfig::default().select(&selection)?;
            }
        }
        self.input_range()?;
        Ok(())
    }

    /// Custom list when given, preset otherwise.
    pub fn selection(&self) -> VariableSelection {
        if self.variables.is_empty() {
            VariableSelection::Pattern(self.pattern)
        } else {
            VariableSelection::Custom(self.variables.clone())
        }
    }

    /// Validated range triple.
    pub fn input_range(&self) -> Result<InputRange> {
        InputRange::new(self.current_range, self.voltage_range, self.crest_factor)
    }

    /// Connect/read timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Host and port.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }
}
