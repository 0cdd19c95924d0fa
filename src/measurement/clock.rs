//! Time source for sampling loops.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Wall clock plus a way to wait.
///
/// Continuous sampling only reads time through this trait, so tests can run a
/// ten-second schedule instantly with [`ManualClock`].
pub trait Clock {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// System time and `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on or advanced.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Start at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move time forward; saturates at the end of the representable range.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.lock();
        let later = TimeDelta::from_std(duration)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta));
        if let Some(later) = later {
            *now = later;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Time elapsed since `start`, zero if the clock went backwards.
pub(crate) fn elapsed_since<C: Clock + ?Sized>(clock: &C, start: DateTime<Utc>) -> Duration {
    (clock.now() - start).to_std().unwrap_or(Duration::ZERO)
}
