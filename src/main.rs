//! CLI Entry Point for gpm-daq
//!
//! Provides command-line interface for:
//! - Listing the measurement items a GPM-8213 understands
//! - Identifying an instrument on the network
//! - Sampling the instruments of a configuration file, one JSON object per line
//!
//! # Usage
//!
//! ```bash
//! gpm-daq catalog
//! gpm-daq identify 192.168.1.50
//! gpm-daq sample --config config/gpm_daq.toml --mode continuous
//! ```
//!
//! Logs go to stderr; stdout only carries samples.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gpm_daq::config::{AppConfig, DEFAULT_CONFIG_PATH};
use gpm_daq::driver::protocol::{DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use gpm_daq::driver::{Endpoint, InstrumentSession, VariableCatalog};
use gpm_daq::logging::{self, parse_log_level, TracingConfig};
use gpm_daq::measurement::{integrate, Measurement, SamplingMode, Sample};
use gpm_daq::AppResult;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "gpm-daq")]
#[command(about = "Sample GW Instek GPM-8213 power analyzers over LAN", long_about = None)]
struct Cli {
    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every measurement item identifier
    Catalog,

    /// Connect, print the instrument identity and release it
    Identify {
        /// Instrument host name or IP address
        host: String,

        /// Control port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Connect and read timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },

    /// Sample the configured instruments and print JSON lines
    Sample {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Override the sampling mode (single, continuous, integrator)
        #[arg(long)]
        mode: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Catalog => {
            init_logging(cli.log_level.as_deref(), None)?;
            print_catalog()
        }
        Commands::Identify {
            host,
            port,
            timeout_ms,
        } => {
            init_logging(cli.log_level.as_deref(), None)?;
            identify(host, port, Duration::from_millis(timeout_ms))
        }
        Commands::Sample { config, mode } => sample(config, mode, cli.log_level.as_deref()),
    }
}

fn init_logging(level_override: Option<&str>, config: Option<&AppConfig>) -> Result<()> {
    let mut tracing_config = match config {
        Some(config) => TracingConfig::from_app_config(config)?,
        None => TracingConfig::default(),
    };
    if let Some(level) = level_override {
        tracing_config.level = parse_log_level(level)?;
    }
    logging::init(tracing_config).context("failed to initialize logging")
}

fn print_catalog() -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for identifier in VariableCatalog::all() {
        writeln!(out, "{identifier}")?;
    }
    Ok(())
}

fn identify(host: String, port: u16, timeout: Duration) -> Result<()> {
    let endpoint = Endpoint::new(host, port);
    let session = InstrumentSession::connect(endpoint.clone(), timeout)
        .with_context(|| format!("failed to identify instrument at {endpoint}"))?;
    println!("{}", session.identity());
    session.close();
    Ok(())
}

fn sample(path: PathBuf, mode: Option<String>, level_override: Option<&str>) -> Result<()> {
    let config = AppConfig::load_from(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    init_logging(level_override, Some(&config))?;
    config.validate().context("invalid configuration")?;

    let mut measurement = Measurement::new(config.sampling_mode()?);
    if let Some(name) = mode {
        measurement.set_mode(SamplingMode::from_parts(
            &name,
            Duration::from_millis(config.sampling.sample_time_ms),
            Duration::from_millis(config.sampling.duration_ms),
        )?);
    }
    info!("Sampling mode: {}", measurement.mode());

    for (id, session_config) in config.session_configs()? {
        info!("Opening instrument '{}' at {}", id, session_config.endpoint());
        let session = InstrumentSession::open(&session_config)
            .with_context(|| format!("failed to open instrument '{id}'"))?;
        measurement.add_instrument(session);
    }

    let stdout = std::io::stdout();
    let samples = measurement
        .run_with(|sample| write_json_line(&mut stdout.lock(), sample))
        .context("sampling failed")?;

    if matches!(measurement.mode(), SamplingMode::Integrator { .. }) {
        let mut out = stdout.lock();
        for integral in integrate(&samples) {
            serde_json::to_writer(&mut out, &integral)?;
            writeln!(out)?;
        }
    }

    measurement.close();
    Ok(())
}

fn write_json_line(out: &mut impl Write, sample: &Sample) -> AppResult<()> {
    serde_json::to_writer(&mut *out, sample)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
