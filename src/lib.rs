//! # GPM DAQ
//!
//! Sampling orchestrator for GW Instek GPM-8213 power analyzers on a LAN. The
//! instrument protocol lives in the `daq-driver-gwinstek` crate (re-exported as
//! [`driver`]); this crate adds what an acquisition run needs on top of single
//! sessions, and the `gpm-daq` command-line frontend.
//!
//! ## Crate Structure
//!
//! - **`config`**: Application configuration (`AppConfig`) loaded with `figment` from a
//!   TOML file and `GPM_DAQ_` environment variables, including per-instrument session
//!   settings.
//! - **`error`**: Defines the `DaqError` enum for centralized error handling.
//! - **`logging`**: `tracing-subscriber` initialisation (pretty, compact or JSON).
//! - **`measurement`**: `Measurement`, which samples a set of instrument sessions once,
//!   continuously, or for integration, and the `Sample` records it produces.

pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;

pub use daq_driver_gwinstek as driver;
pub use error::{AppResult, DaqError};
