//! Timing model
//!
//! Produces randomized delays. The main action delay is drawn from a Gaussian
//! centred between the configured bounds (σ = range / 6) and clamped into the
//! range, so almost every draw lands naturally inside it and none escape.
//!
//! Auxiliary pauses model the small human hesitations around page actions.

use crate::error::GovernError;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reading speed bounds in words per minute
const READ_WPM_MIN: u32 = 200;
const READ_WPM_MAX: u32 = 250;

/// Bounded Gaussian delay profile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimingProfile")]
pub struct TimingProfile {
    #[serde(with = "crate::types::duration_ms")]
    min_delay: Duration,
    #[serde(with = "crate::types::duration_ms")]
    max_delay: Duration,
}

/// Wire form of [`TimingProfile`]; deserialization goes through [`TimingProfile::new`]
#[derive(Deserialize)]
struct RawTimingProfile {
    #[serde(with = "crate::types::duration_ms")]
    min_delay: Duration,
    #[serde(with = "crate::types::duration_ms")]
    max_delay: Duration,
}

impl TryFrom<RawTimingProfile> for TimingProfile {
    type Error = GovernError;

    fn try_from(raw: RawTimingProfile) -> Result<Self, Self::Error> {
        Self::new(raw.min_delay, raw.max_delay)
    }
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl TimingProfile {
    /// Create a profile; fails when `min_delay > max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Result<Self, GovernError> {
        if min_delay > max_delay {
            return Err(GovernError::InvalidTiming(format!(
                "min delay {:?} exceeds max delay {:?}",
                min_delay, max_delay
            )));
        }
        Ok(Self {
            min_delay,
            max_delay,
        })
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Draw an action delay, always within `[min_delay, max_delay]`
    pub fn random_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let std_dev = (max - min) / 6.0;
        if std_dev <= 0.0 {
            return self.min_delay;
        }

        let mean = (min + max) / 2.0;
        let secs = match Normal::new(mean, std_dev) {
            Ok(normal) => normal.sample(rng),
            Err(_) => mean,
        };

        Duration::from_secs_f64(secs.clamp(min, max)).clamp(self.min_delay, self.max_delay)
    }

    /// Hesitation before a deliberate action (2-8 s)
    pub fn think_time<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_secs(rng, 2.0, 8.0)
    }

    /// Time a person needs to read `word_count` words at 200-250 wpm
    pub fn read_time<R: Rng + ?Sized>(&self, rng: &mut R, word_count: u32) -> Duration {
        let wpm = rng.random_range(READ_WPM_MIN..READ_WPM_MAX) as f64;
        let words_per_second = wpm / 60.0;
        Duration::from_secs_f64(word_count as f64 / words_per_second)
    }

    /// Pause before starting to scroll (1-3 s)
    pub fn scroll_think_time<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_secs(rng, 1.0, 3.0)
    }

    /// Perceived page settle time after navigation (1.5-4 s)
    pub fn page_load_wait<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_secs(rng, 1.5, 4.0)
    }

    /// Pause while composing text (0.5-2.5 s)
    pub fn typing_pause<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        uniform_secs(rng, 0.5, 2.5)
    }
}

/// Uniform duration in `[lo, hi)` seconds
pub(crate) fn uniform_secs<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> Duration {
    if hi <= lo {
        return Duration::from_secs_f64(lo.max(0.0));
    }
    Duration::from_secs_f64(rng.random_range(lo..hi))
}

/// Uniform duration in `[lo, hi)` milliseconds
pub(crate) fn uniform_millis<R: Rng + ?Sized>(rng: &mut R, lo: u64, hi: u64) -> Duration {
    if hi <= lo {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rng.random_range(lo..hi))
}

/// Symmetric uniform offset in `[-spread, spread)`
pub(crate) fn symmetric<R: Rng + ?Sized>(rng: &mut R, spread: f64) -> f64 {
    (rng.random::<f64>() * 2.0 - 1.0) * spread
}
