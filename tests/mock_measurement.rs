//! End-to-end sampling run over the shipped configuration file, using the
//! in-memory instrument it declares.

use chrono::{TimeZone, Utc};
use gpm_daq::config::AppConfig;
use gpm_daq::driver::InstrumentSession;
use gpm_daq::measurement::{integrate, ManualClock, Measurement, SamplingMode};
use std::path::Path;
use std::time::Duration;

fn shipped_config() -> AppConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/gpm_daq.toml");
    let config = AppConfig::load_from(path).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn shipped_config_opens_mock_instrument() {
    let config = shipped_config();
    let sessions = config.session_configs().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].0, "mock");
    assert!(sessions[0].1.mock);

    let mut measurement = Measurement::new(config.sampling_mode().unwrap());
    let configs: Vec<_> = sessions.into_iter().map(|(_, c)| c).collect();
    measurement.open_instruments(&configs).unwrap();

    let samples = measurement.run().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].values.len(), 3);
    assert!(samples[0].instrument.ends_with(",mock,23"));
    measurement.close();
}

#[test]
fn integrator_run_over_mock_instrument() {
    let config = shipped_config();
    let (_, session_config) = config.session_configs().unwrap().remove(0);
    let session = InstrumentSession::open(&session_config).unwrap();

    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
    let mode = SamplingMode::Integrator {
        sample_time: Duration::from_millis(500),
        duration: Duration::from_secs(3),
    };
    let mut measurement = Measurement::with_clock(mode, clock);
    measurement.add_instrument(session);

    let samples = measurement.run().unwrap();
    assert_eq!(samples.len(), 6);

    let integrals = integrate(&samples);
    assert_eq!(integrals.len(), 1);
    assert_eq!((integrals[0].end - integrals[0].start).num_milliseconds(), 2500);
    // mock values rise by one per round, so every integral is positive
    assert!(integrals[0].values.values().all(|v| *v > 0.0));
}
