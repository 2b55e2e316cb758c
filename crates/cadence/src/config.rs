//! # Clock Configuration
//!
//! Construction-time settings for a [`FrameClock`](crate::FrameClock),
//! loadable once at startup from TOML. Nothing here changes while the loop
//! is running.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::policy::ErrorPolicy;

/// How simulated time advances per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeltaMode {
    /// Add a fixed delta every tick, independent of wall time.
    Fixed {
        /// The per-tick delta in seconds.
        seconds: f64,
    },
    /// Add the measured real time elapsed since the previous tick.
    Measured,
}

impl Default for DeltaMode {
    fn default() -> Self {
        Self::Fixed {
            seconds: 1.0 / 60.0,
        }
    }
}

/// Settings for one frame clock.
///
/// ```toml
/// wait_capacity = 128
/// policy = "strict"
///
/// [delta]
/// mode = "fixed"
/// seconds = 0.016666
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Simulated-time advancement per tick.
    pub delta: DeltaMode,
    /// Disposition of user-code errors.
    pub policy: ErrorPolicy,
    /// Pre-allocated slots for pending timing-point waits.
    pub wait_capacity: usize,
}

impl ClockConfig {
    /// Parses a config from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document does not match the
    /// schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

/// Source of real elapsed time for a clock.
///
/// The clock queries this once per tick (and on demand for
/// `delay_real_time`). Implementations report time elapsed since the
/// source's own origin; the clock only ever looks at differences.
pub trait TimeSource: Send {
    /// Current elapsed real time.
    fn now(&mut self) -> Duration;
}

/// The default time source, backed by [`Instant`].
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Creates a source whose origin is the moment of the call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&mut self) -> Duration {
        self.origin.elapsed()
    }
}

/// A hand-driven time source for tests and replay.
///
/// Clone the handle, give [`ManualTime::source`] to the clock, and call
/// [`ManualTime::advance`] between ticks.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    value: Arc<Mutex<Duration>>,
}

impl ManualTime {
    /// Creates a handle starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.value.lock() += delta;
    }

    /// Current value of the handle.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.value.lock()
    }

    /// Returns a [`TimeSource`] reading this handle.
    #[must_use]
    pub fn source(&self) -> Box<dyn TimeSource> {
        Box::new(ManualTimeSource {
            value: Arc::clone(&self.value),
        })
    }
}

struct ManualTimeSource {
    value: Arc<Mutex<Duration>>,
}

impl TimeSource for ManualTimeSource {
    fn now(&mut self) -> Duration {
        *self.value.lock()
    }
}
