//! Engine configuration
//!
//! One serde structure with a section per component. Every field has a
//! default, so an empty JSON object is a complete configuration.
//!
//! ```json
//! {
//!   "seed": 42,
//!   "timing": { "min_delay_ms": 2000, "max_delay_ms": 8000 },
//!   "limits": { "connection_requests": { "hourly": 10, "daily": 50, "weekly": 200 } },
//!   "schedule": { "timezone": "Europe/Berlin", "start_hour": 9, "end_hour": 17 }
//! }
//! ```

use crate::attention::BehaviorConfig;
use crate::bloom::DedupConfig;
use crate::error::GovernError;
use crate::keystroke::TypingConfig;
use crate::limiter::LimitsConfig;
use crate::logging::LoggingConfig;
use crate::motion::MotionConfig;
use crate::schedule::{ScheduleConfig, ScheduleWindow};
use crate::scroll::ScrollConfig;
use crate::timing::TimingProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bounds for the delay between actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2_000,
            max_delay_ms: 8_000,
        }
    }
}

impl TimingConfig {
    pub fn profile(&self) -> Result<TimingProfile, GovernError> {
        TimingProfile::new(
            Duration::from_millis(self.min_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Fixed seed for every random source; unset draws from the OS
    pub seed: Option<u64>,
    pub timing: TimingConfig,
    pub mouse: MotionConfig,
    pub typing: TypingConfig,
    pub scroll: ScrollConfig,
    pub behavior: BehaviorConfig,
    pub limits: LimitsConfig,
    pub schedule: ScheduleConfig,
    pub dedup: DedupConfig,
    pub logging: LoggingConfig,
}

impl GovernorConfig {
    pub fn from_json(json: &str) -> Result<Self, GovernError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GovernError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, GovernError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every section; stops at the first problem
    pub fn validate(&self) -> Result<(), GovernError> {
        self.timing.profile()?;
        self.mouse.validate()?;
        self.typing.validate()?;
        self.scroll.validate()?;
        self.behavior.validate()?;
        self.limits.validate()?;
        ScheduleWindow::from_config(&self.schedule)?;
        self.dedup.validate()?;
        self.logging.validate()
    }

    /// Check every section and collect all problems
    pub fn problems(&self) -> Vec<GovernError> {
        let checks = [
            self.timing.profile().map(|_| ()),
            self.mouse.validate(),
            self.typing.validate(),
            self.scroll.validate(),
            self.behavior.validate(),
            self.limits.validate(),
            ScheduleWindow::from_config(&self.schedule).map(|_| ()),
            self.dedup.validate(),
            self.logging.validate(),
        ];
        checks.into_iter().filter_map(Result::err).collect()
    }
}
