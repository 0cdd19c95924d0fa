//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/gpm_daq.toml`)
//! 2. environment variables prefixed with `GPM_DAQ_`, nested keys separated by
//!    `__` (e.g. `GPM_DAQ_APPLICATION__LOG_LEVEL=debug`)
//!
//! Every section has defaults, so an empty file is a valid configuration that
//! samples nothing.
//!
//! # Example
//! ```toml
//! [application]
//! log_level = "info"
//! log_format = "compact"
//!
//! [sampling]
//! mode = "continuous"
//! sample_time_ms = 500
//! duration_ms = 60000
//!
//! [[instruments]]
//! id = "bench"
//! [instruments.config]
//! host = "192.168.1.50"
//! pattern = 1
//! ```
//!
//! ```no_run
//! use gpm_daq::config::AppConfig;
//!
//! # fn main() -> gpm_daq::AppResult<()> {
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Sampling mode: {}", config.sampling_mode()?);
//! # Ok(())
//! # }
//! ```

use crate::error::{AppResult, DaqError};
use crate::logging::{parse_log_level, OutputFormat};
use crate::measurement::{SamplingMode, DEFAULT_DURATION, DEFAULT_SAMPLE_TIME};
use daq_driver_gwinstek::SessionConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/gpm_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GPM_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Sampling schedule
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Sampling schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// single, continuous or integrator
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Period between rounds in milliseconds
    #[serde(default = "default_sample_time_ms")]
    pub sample_time_ms: u64,
    /// Run length in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier
    pub id: String,
    /// Whether this instrument is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Session settings, parsed into [`SessionConfig`]
    pub config: toml::Value,
}

// Default value functions
fn default_name() -> String {
    "GPM DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_mode() -> String {
    "single".to_string()
}

fn default_sample_time_ms() -> u64 {
    DEFAULT_SAMPLE_TIME.as_millis() as u64
}

fn default_duration_ms() -> u64 {
    DEFAULT_DURATION.as_millis() as u64
}

fn default_enabled() -> bool {
    true
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            sample_time_ms: default_sample_time_ms(),
            duration_ms: default_duration_ms(),
        }
    }
}

impl InstrumentDefinition {
    /// Parse and validate the session settings.
    pub fn session_config(&self) -> AppResult<SessionConfig> {
        SessionConfig::from_toml_validated(&self.config).map_err(|e| {
            DaqError::Configuration(format!("instrument '{}': {}", self.id, e))
        })
    }
}

impl AppConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        parse_log_level(&self.application.log_level)?;
        self.application.log_format.parse::<OutputFormat>()?;
        self.sampling_mode()?;

        // Validate instrument IDs are unique
        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if !ids.insert(instrument.id.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate instrument ID: {}",
                    instrument.id
                )));
            }
            instrument.session_config()?;
        }

        Ok(())
    }

    /// Sampling mode with its timing.
    pub fn sampling_mode(&self) -> AppResult<SamplingMode> {
        SamplingMode::from_parts(
            &self.sampling.mode,
            Duration::from_millis(self.sampling.sample_time_ms),
            Duration::from_millis(self.sampling.duration_ms),
        )
    }

    /// Get all enabled instruments
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments
            .iter()
            .filter(|inst| inst.enabled)
            .collect()
    }

    /// Session settings of every enabled instrument, keyed by id.
    pub fn session_configs(&self) -> AppResult<Vec<(String, SessionConfig)>> {
        self.enabled_instruments()
            .into_iter()
            .map(|inst| Ok((inst.id.clone(), inst.session_config()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_gwinstek::{Mode, VariableSelection};
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    fn definition(id: &str, config: &str) -> InstrumentDefinition {
        InstrumentDefinition {
            id: id.to_string(),
            enabled: true,
            config: toml::from_str(config).unwrap(),
        }
    }

    #[test]
    fn loads_full_file() {
        let file = write_config(
            r#"
            [application]
            log_level = "debug"
            log_format = "json"

            [sampling]
            mode = "continuous"
            sample_time_ms = 250
            duration_ms = 2000

            [[instruments]]
            id = "bench"
            [instruments.config]
            host = "192.168.1.50"
            pattern = 1
            mode = "DC"

            [[instruments]]
            id = "spare"
            enabled = false
            [instruments.config]
            host = "192.168.1.51"
            variables = ["U", "I", "WH"]
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(
            config.sampling_mode().unwrap(),
            SamplingMode::Continuous {
                sample_time: Duration::from_millis(250),
                duration: Duration::from_secs(2)
            }
        );

        let sessions = config.session_configs().unwrap();
        assert_eq!(sessions.len(), 1);
        let (id, session) = &sessions[0];
        assert_eq!(id, "bench");
        assert_eq!(session.host, "192.168.1.50");
        assert_eq!(session.selection(), VariableSelection::Pattern(1));
        assert_eq!(session.mode, Mode::Dc);
        assert_eq!(session.port, 23);
    }

    #[test]
    fn session_settings_nest_under_instrument_config() {
        let file = write_config(
            r#"
            [[instruments]]
            id = "bench"
            [instruments.config]
            host = "192.168.1.50"
            pattern = 2
            mode = "AC"
            current_range = 0.5
            voltage_range = 300
            "#,
        );

        let config = AppConfig::load_from(file.path()).unwrap();
        config.validate().unwrap();
        let (id, session) = config.session_configs().unwrap().remove(0);
        assert_eq!(id, "bench");
        assert_eq!(session.selection(), VariableSelection::Pattern(2));
        assert_eq!(session.mode, Mode::Ac);
        let range = session.input_range().unwrap();
        assert_eq!(range.current(), 0.5);
        assert_eq!(range.voltage(), 300.0);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling_mode().unwrap(), SamplingMode::Single);
        assert!(config.instruments.is_empty());
        assert_eq!(config.application.log_format, "pretty");
    }

    #[test]
    fn malformed_file_is_a_figment_error() {
        let file = write_config("[sampling]\nsample_time_ms = \"fast\"\n");
        assert!(matches!(AppConfig::load_from(file.path()), Err(DaqError::Config(_))));
    }

    #[test]
    fn invalid_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_sampling_mode() {
        let mut config = AppConfig::default();
        config.sampling.mode = "burst".into();
        assert!(matches!(config.validate(), Err(DaqError::Configuration(_))));
    }

    #[test]
    fn duplicate_instrument_ids() {
        let config = AppConfig {
            instruments: vec![
                definition("gpm", r#"host = "10.0.0.1""#),
                definition("gpm", r#"host = "10.0.0.2""#),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate instrument ID: gpm"));
    }

    #[test]
    fn invalid_instrument_settings_name_the_instrument() {
        let config = AppConfig {
            instruments: vec![definition(
                "bench",
                "host = \"10.0.0.1\"\ncrest_factor = 6",
            )],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("instrument 'bench'"));
    }
}
