//! Operating-window scheduler
//!
//! Decides from wall-clock time alone whether automated work may run. There is
//! no stored state: a timestamp is *operating* when its local weekday is a
//! configured workday, its hour is inside `[start_hour, end_hour)` and it is
//! not inside a break.
//!
//! A break `{h, h}` is a short break covering minutes 0-14 of hour `h`; any
//! other break `{s, e}` blocks every hour in `[s, e)`.

use crate::cancel::{sleep_cancellable, CancellationToken};
use crate::clock::Clock;
use crate::error::GovernError;
use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc, Weekday,
};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Longest single sleep while waiting for the next window
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Minutes of the hour covered by a short break
const SHORT_BREAK_MINUTES: u32 = 15;

const WORK_SESSION_MINUTES: (u64, u64) = (30, 90);
const SESSION_BREAK_MINUTES: (u64, u64) = (5, 10);

/// Raw break window as configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakConfig {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Operating window, the `schedule` section of the configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA timezone name, e.g. "America/New_York"
    pub timezone: String,
    pub start_hour: u32,
    pub end_hour: u32,
    /// Weekday names ("monday", "Tue", ...)
    pub work_days: Vec<String>,
    pub breaks: Vec<BreakConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            start_hour: 9,
            end_hour: 17,
            work_days: ["monday", "tuesday", "wednesday", "thursday", "friday"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            breaks: vec![
                BreakConfig {
                    start_hour: 12,
                    end_hour: 13,
                },
                BreakConfig {
                    start_hour: 10,
                    end_hour: 10,
                },
                BreakConfig {
                    start_hour: 15,
                    end_hour: 15,
                },
            ],
        }
    }
}

/// Validated, immutable operating window
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleWindow {
    timezone: Tz,
    start_hour: u32,
    end_hour: u32,
    workdays: HashSet<Weekday>,
    breaks: Vec<BreakConfig>,
}

impl ScheduleWindow {
    /// Build a window, rejecting unknown timezones and inverted hours
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, GovernError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| GovernError::InvalidTimezone(config.timezone.clone()))?;

        if config.start_hour >= config.end_hour || config.end_hour > 24 {
            return Err(GovernError::InvalidHourRange {
                start: config.start_hour,
                end: config.end_hour,
            });
        }

        let mut workdays = HashSet::new();
        for name in &config.work_days {
            let day: Weekday = name
                .trim()
                .parse()
                .map_err(|_| GovernError::InvalidWorkday(name.clone()))?;
            workdays.insert(day);
        }
        if workdays.is_empty() {
            return Err(GovernError::InvalidWorkday(
                "at least one workday is required".to_string(),
            ));
        }

        for b in &config.breaks {
            if b.start_hour > b.end_hour || b.end_hour > 24 || b.start_hour > 23 {
                return Err(GovernError::InvalidBreak(format!(
                    "{{{}, {}}}",
                    b.start_hour, b.end_hour
                )));
            }
        }

        Ok(Self {
            timezone,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            workdays,
            breaks: config.breaks.clone(),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn status(&self, now: DateTime<Utc>) -> ScheduleStatus {
        let local = now.with_timezone(&self.timezone);

        if !self.workdays.contains(&local.weekday()) {
            return ScheduleStatus::Idle { reason: IdleReason::NotWorkday };
        }

        let hour = local.hour();
        if hour < self.start_hour {
            return ScheduleStatus::Idle { reason: IdleReason::BeforeHours };
        }
        if hour >= self.end_hour {
            return ScheduleStatus::Idle { reason: IdleReason::AfterHours };
        }

        if self.in_break(hour, local.minute()) {
            return ScheduleStatus::Idle { reason: IdleReason::OnBreak };
        }

        ScheduleStatus::Operating
    }

    pub fn should_operate(&self, now: DateTime<Utc>) -> bool {
        self.status(now).is_operating()
    }

    fn in_break(&self, hour: u32, minute: u32) -> bool {
        self.breaks.iter().any(|b| {
            if b.start_hour == b.end_hour {
                hour == b.start_hour && minute < SHORT_BREAK_MINUTES
            } else {
                hour >= b.start_hour && hour < b.end_hour
            }
        })
    }

    /// Earliest instant at or after `now` that is operating
    ///
    /// Windows can only open at `start_hour:00` or where a break ends, so only
    /// those boundaries over the next eight days are examined.
    pub fn next_opening(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.should_operate(now) {
            return Some(now);
        }

        let today = now.with_timezone(&self.timezone).date_naive();
        let mut boundaries = vec![NaiveTime::from_hms_opt(self.start_hour, 0, 0)];
        for b in &self.breaks {
            if b.start_hour == b.end_hour {
                boundaries.push(NaiveTime::from_hms_opt(b.start_hour, SHORT_BREAK_MINUTES, 0));
            } else if b.end_hour < 24 {
                boundaries.push(NaiveTime::from_hms_opt(b.end_hour, 0, 0));
            }
        }

        (0..=8)
            .filter_map(|offset| today.checked_add_signed(ChronoDuration::days(offset)))
            .flat_map(|date| boundaries.iter().flatten().map(move |t| date.and_time(*t)))
            .filter_map(|naive| self.resolve_local(naive))
            .filter(|candidate| *candidate > now && self.should_operate(*candidate))
            .min()
    }

    /// UTC instant of a local wall-clock time; a time skipped by a DST gap
    /// resolves to the same time an hour later, the first valid hour after it
    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .or_else(|| {
                let shifted = naive.checked_add_signed(ChronoDuration::hours(1))?;
                self.timezone.from_local_datetime(&shifted).earliest()
            })
            .map(|local| local.with_timezone(&Utc))
    }

    /// How long to sleep before checking again: the time to the next opening,
    /// capped at 15 minutes and never below one second
    pub fn next_poll_delay(&self, now: DateTime<Utc>) -> Duration {
        let until_open = self
            .next_opening(now)
            .and_then(|open| (open - now).to_std().ok())
            .unwrap_or(MAX_POLL_INTERVAL);
        until_open.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    }
}

/// Why the scheduler is not operating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleReason {
    NotWorkday,
    BeforeHours,
    AfterHours,
    OnBreak,
}

impl fmt::Display for IdleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IdleReason::NotWorkday => "not a workday",
            IdleReason::BeforeHours => "before operating hours",
            IdleReason::AfterHours => "after operating hours",
            IdleReason::OnBreak => "on break",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ScheduleStatus {
    Operating,
    Idle { reason: IdleReason },
}

impl ScheduleStatus {
    pub fn is_operating(&self) -> bool {
        matches!(self, ScheduleStatus::Operating)
    }
}

/// Operating-window scheduler with session length generators
pub struct OperatingSchedule<R: Rng = StdRng> {
    window: ScheduleWindow,
    rng: R,
}

impl OperatingSchedule<StdRng> {
    pub fn seeded(config: &ScheduleConfig, seed: u64) -> Result<Self, GovernError> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(config: &ScheduleConfig) -> Result<Self, GovernError> {
        Self::new(config, StdRng::from_os_rng())
    }
}

impl<R: Rng> OperatingSchedule<R> {
    pub fn new(config: &ScheduleConfig, rng: R) -> Result<Self, GovernError> {
        Ok(Self {
            window: ScheduleWindow::from_config(config)?,
            rng,
        })
    }

    pub fn window(&self) -> &ScheduleWindow {
        &self.window
    }

    pub fn should_operate(&self, now: DateTime<Utc>) -> bool {
        self.window.should_operate(now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> ScheduleStatus {
        self.window.status(now)
    }

    pub fn next_opening(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window.next_opening(now)
    }

    pub fn next_poll_delay(&self, now: DateTime<Utc>) -> Duration {
        self.window.next_poll_delay(now)
    }

    pub async fn wait_until_operating(
        &self,
        clock: &dyn Clock,
        token: &CancellationToken,
    ) -> Result<(), GovernError> {
        self.window.wait_until_operating(clock, token).await
    }

    /// Length of a work session to run before a self-imposed break (30-90 min)
    pub fn random_work_duration(&mut self) -> Duration {
        let minutes = self
            .rng
            .random_range(WORK_SESSION_MINUTES.0..WORK_SESSION_MINUTES.1);
        Duration::from_secs(minutes * 60)
    }

    /// Length of a short break between work sessions (5-10 min)
    pub fn break_duration(&mut self) -> Duration {
        let minutes = self
            .rng
            .random_range(SESSION_BREAK_MINUTES.0..SESSION_BREAK_MINUTES.1);
        Duration::from_secs(minutes * 60)
    }
}

impl ScheduleWindow {
    /// Sleep until the window is operating
    ///
    /// Polls `clock`, sleeping at most 15 minutes at a time and less as the
    /// next opening approaches. Returns `Err(Cancelled)` when `token` fires.
    pub async fn wait_until_operating(
        &self,
        clock: &dyn Clock,
        token: &CancellationToken,
    ) -> Result<(), GovernError> {
        loop {
            token.check()?;
            let now = clock.now();
            let status = self.status(now);
            if status.is_operating() {
                debug!("operating window open");
                return Ok(());
            }

            let delay = self.next_poll_delay(now);
            if let ScheduleStatus::Idle { reason } = status {
                info!(
                    reason = %reason,
                    sleep_secs = delay.as_secs(),
                    "outside operating window, sleeping"
                );
            }
            sleep_cancellable(delay, token).await?;
        }
    }
}
