// src/measurement/mod.rs

//! Sampling runs across one or more GPM instruments.
//!
//! A [`Measurement`] owns a set of open sessions and a [`SamplingMode`]:
//!
//! - **single**: one round. Every instrument is triggered first, then every
//!   reply is collected, so the instruments sample as close together as the
//!   network allows.
//! - **continuous**: rounds every `sample_time` until `duration` has elapsed.
//!   The remainder of each period is slept away; a round that takes longer than
//!   `sample_time` is followed immediately by the next.
//! - **integrator**: continuous sampling whose samples are meant to be fed to
//!   [`integrate`].
//!
//! No round is retried. An instrument error ends the run and is returned;
//! samples gathered before it are lost to the caller unless it used
//! [`Measurement::run_with`].

mod clock;
mod sample;

pub use clock::{Clock, ManualClock, SystemClock};
pub use sample::{integrate, Integral, Sample};

use crate::error::{AppResult, DaqError};
use clock::elapsed_since;
use daq_driver_gwinstek::{DeviceConfig, InstrumentSession, SessionConfig, VariableSelection};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Default period between continuous rounds.
pub const DEFAULT_SAMPLE_TIME: Duration = Duration::from_secs(1);

/// Default length of a continuous or integrator run.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

/// How a [`Measurement`] samples its instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// One round
    #[default]
    Single,
    /// Rounds every `sample_time` for `duration`
    Continuous {
        /// Period between rounds
        sample_time: Duration,
        /// Total run length
        duration: Duration,
    },
    /// Continuous run whose samples are integrated over time
    Integrator {
        /// Period between rounds
        sample_time: Duration,
        /// Total run length
        duration: Duration,
    },
}

impl SamplingMode {
    /// Build a mode from its name and timing.
    ///
    /// Timing is ignored for `single`. A zero `sample_time` is rejected for
    /// the timed modes.
    pub fn from_parts(name: &str, sample_time: Duration, duration: Duration) -> AppResult<Self> {
        let mode = match name.trim().to_ascii_lowercase().as_str() {
            "single" => return Ok(SamplingMode::Single),
            "continuous" => SamplingMode::Continuous {
                sample_time,
                duration,
            },
            "integrator" => SamplingMode::Integrator {
                sample_time,
                duration,
            },
            other => {
                return Err(DaqError::Configuration(format!(
                    "unknown sampling mode '{other}'. Must be one of: single, continuous, integrator"
                )))
            }
        };
        if sample_time.is_zero() {
            return Err(DaqError::Configuration(format!(
                "{} sampling needs a sample time greater than 0",
                mode.name()
            )));
        }
        Ok(mode)
    }

    /// `single`, `continuous` or `integrator`.
    pub fn name(&self) -> &'static str {
        match self {
            SamplingMode::Single => "single",
            SamplingMode::Continuous { .. } => "continuous",
            SamplingMode::Integrator { .. } => "integrator",
        }
    }

    /// Period and run length of the timed modes.
    pub fn timing(&self) -> Option<(Duration, Duration)> {
        match *self {
            SamplingMode::Single => None,
            SamplingMode::Continuous {
                sample_time,
                duration,
            }
            | SamplingMode::Integrator {
                sample_time,
                duration,
            } => Some((sample_time, duration)),
        }
    }
}

impl FromStr for SamplingMode {
    type Err = DaqError;

    fn from_str(s: &str) -> AppResult<Self> {
        Self::from_parts(s, DEFAULT_SAMPLE_TIME, DEFAULT_DURATION)
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sampling run over a set of instrument sessions.
pub struct Measurement<C: Clock = SystemClock> {
    mode: SamplingMode,
    sessions: Vec<InstrumentSession>,
    clock: C,
}

impl Measurement<SystemClock> {
    /// Empty measurement on the system clock.
    pub fn new(mode: SamplingMode) -> Self {
        Self::with_clock(mode, SystemClock)
    }
}

impl<C: Clock> Measurement<C> {
    /// Empty measurement on a custom clock.
    pub fn with_clock(mode: SamplingMode, clock: C) -> Self {
        Self {
            mode,
            sessions: Vec::new(),
            clock,
        }
    }

    /// Sampling mode.
    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    /// Change the sampling mode for the next run.
    pub fn set_mode(&mut self, mode: SamplingMode) {
        self.mode = mode;
    }

    /// Take ownership of an open session.
    pub fn add_instrument(&mut self, session: InstrumentSession) {
        info!("Added instrument {} to measurement", session.label());
        self.sessions.push(session);
    }

    /// Take ownership of several open sessions.
    pub fn add_instruments(&mut self, sessions: impl IntoIterator<Item = InstrumentSession>) {
        for session in sessions {
            self.add_instrument(session);
        }
    }

    /// Open and add one session per config, stopping at the first failure.
    pub fn open_instruments(&mut self, configs: &[SessionConfig]) -> AppResult<()> {
        for config in configs {
            let session = InstrumentSession::open(config)?;
            self.add_instrument(session);
        }
        Ok(())
    }

    /// Number of instruments.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True without instruments.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Apply the same item list or preset to every instrument.
    ///
    /// The selection is validated once before any instrument is touched.
    pub fn homogenize_variables(&mut self, selection: &VariableSelection) -> AppResult<()> {
        DeviceConfig::default().select(selection)?;
        for session in &mut self.sessions {
            session.select(selection)?;
        }
        Ok(())
    }

    /// Run the configured mode and return every sample.
    pub fn run(&mut self) -> AppResult<Vec<Sample>> {
        self.run_with(|_| Ok(()))
    }

    /// Run the configured mode, handing each sample to `on_sample` as soon as
    /// its round completes.
    pub fn run_with<F>(&mut self, mut on_sample: F) -> AppResult<Vec<Sample>>
    where
        F: FnMut(&Sample) -> AppResult<()>,
    {
        if self.sessions.is_empty() {
            return Err(DaqError::Configuration("measurement has no instruments".into()));
        }
        info!("Starting {} measurement on {} instrument(s)", self.mode, self.sessions.len());

        let samples = match self.mode.timing() {
            None => {
                let round = self.sample_once()?;
                for sample in &round {
                    on_sample(sample)?;
                }
                round
            }
            Some((sample_time, duration)) => self.run_timed(sample_time, duration, &mut on_sample)?,
        };

        info!("Measurement finished with {} samples", samples.len());
        Ok(samples)
    }

    /// One fan-out round: trigger every instrument, then collect every reply.
    pub fn sample_once(&mut self) -> AppResult<Vec<Sample>> {
        let timestamp = self.clock.now();
        for session in &mut self.sessions {
            session.trigger()?;
        }

        let mut round = Vec::with_capacity(self.sessions.len());
        for session in &mut self.sessions {
            let reading = session.collect()?;
            round.push(Sample::from_reading(timestamp, session.label(), &reading));
        }
        debug!("Sampled {} instrument(s) at {}", round.len(), timestamp);
        Ok(round)
    }

    fn run_timed<F>(
        &mut self,
        sample_time: Duration,
        duration: Duration,
        on_sample: &mut F,
    ) -> AppResult<Vec<Sample>>
    where
        F: FnMut(&Sample) -> AppResult<()>,
    {
        let start = self.clock.now();
        let mut samples = Vec::new();

        while elapsed_since(&self.clock, start) < duration {
            let round_start = self.clock.now();
            let round = self.sample_once()?;
            for sample in &round {
                on_sample(sample)?;
            }
            samples.extend(round);

            let spent = elapsed_since(&self.clock, round_start);
            if let Some(rest) = sample_time.checked_sub(spent) {
                if !rest.is_zero() {
                    self.clock.sleep(rest);
                }
            }
        }
        Ok(samples)
    }

    /// Release every instrument.
    pub fn close(self) {
        for session in self.sessions {
            session.close();
        }
    }
}
