//! Adaptive rate limiter
//!
//! Tracks successful actions in hour, day and ISO-week windows and guards them
//! with a circuit breaker. Each action stream gets its own limiter; all of its
//! state sits behind one lock so a check and a record never interleave.
//!
//! Window keys are integer day numbers in the operating timezone:
//! - day: days since 0001-01-01 (CE)
//! - hour: `day * 24 + hour`
//! - week: day number of the ISO week's Monday
//!
//! Keys sort chronologically, which is what the retention purge relies on.
//!
//! Breaker lifecycle:
//! - success resets the failure streak and the backoff to its floor
//! - every failure doubles the backoff up to a cap
//! - after `failure_threshold` consecutive failures the breaker opens for
//!   `open_duration` (re-armed by each further failure)
//! - the first check after `open_until` closes it again

use crate::cancel::{sleep_cancellable, CancellationToken};
use crate::error::GovernError;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Network-visible action streams, each limited independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ConnectionRequest,
    Message,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::ConnectionRequest, ActionKind::Message];
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::ConnectionRequest => f.write_str("connection_request"),
            ActionKind::Message => f.write_str("message"),
        }
    }
}

/// Per-window action ceilings for one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCeilings {
    pub hourly: u32,
    pub daily: u32,
    /// `None` leaves the week unbounded
    #[serde(default)]
    pub weekly: Option<u32>,
}

impl RateCeilings {
    pub fn validate(&self, stream: &str) -> Result<(), GovernError> {
        if self.hourly == 0 || self.daily == 0 || self.weekly == Some(0) {
            return Err(GovernError::InvalidLimit(format!(
                "{stream}: ceilings must be positive (hourly {}, daily {}, weekly {:?})",
                self.hourly, self.daily, self.weekly
            )));
        }
        Ok(())
    }
}

/// Ceilings for every stream, the `limits` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub connection_requests: RateCeilings,
    pub messages: RateCeilings,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connection_requests: RateCeilings {
                hourly: 10,
                daily: 50,
                weekly: Some(200),
            },
            messages: RateCeilings {
                hourly: 5,
                daily: 30,
                weekly: None,
            },
        }
    }
}

impl LimitsConfig {
    pub fn ceilings_for(&self, kind: ActionKind) -> RateCeilings {
        match kind {
            ActionKind::ConnectionRequest => self.connection_requests,
            ActionKind::Message => self.messages,
        }
    }

    pub fn validate(&self) -> Result<(), GovernError> {
        self.connection_requests
            .validate("limits.connection_requests")?;
        self.messages.validate("limits.messages")
    }
}

/// Backoff and breaker tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerPolicy {
    pub backoff_floor: Duration,
    pub backoff_cap: Duration,
    pub failure_threshold: u32,
    pub open_duration: Duration,
    pub retention_days: i64,
    /// Symmetric jitter applied by [`AdaptiveRateLimiter::wait`], as a fraction
    pub jitter: f64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            backoff_floor: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(5 * 60),
            failure_threshold: 3,
            open_duration: Duration::from_secs(60 * 60),
            retention_days: 30,
            jitter: 0.2,
        }
    }
}

/// Why an action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CircuitOpen,
    HourlyLimit,
    DailyLimit,
    WeeklyLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: RejectReason,
    /// Earliest time the refused check could pass
    #[serde(with = "crate::types::duration_ms")]
    pub retry_after: Duration,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.retry_after.as_secs();
        match self.reason {
            RejectReason::CircuitOpen => write!(f, "circuit breaker open, retry in {secs}s"),
            RejectReason::HourlyLimit => {
                write!(f, "hourly limit reached, window resets in {secs}s")
            }
            RejectReason::DailyLimit => write!(f, "daily limit reached, window resets in {secs}s"),
            RejectReason::WeeklyLimit => {
                write!(f, "weekly limit reached, window resets in {secs}s")
            }
        }
    }
}

/// Outcome of [`AdaptiveRateLimiter::can_send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Admission {
    Allowed,
    Rejected(Rejection),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Admission::Allowed => None,
            Admission::Rejected(r) => Some(r),
        }
    }
}

/// Counters keyed by hour, day and ISO week
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounters {
    hours: BTreeMap<i64, u32>,
    days: BTreeMap<i64, u32>,
    weeks: BTreeMap<i64, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowKeys {
    hour: i64,
    day: i64,
    week: i64,
}

impl WindowKeys {
    fn at(tz: Tz, now: DateTime<Utc>) -> Self {
        let local = now.with_timezone(&tz);
        let date = local.date_naive();
        let day = i64::from(date.num_days_from_ce());
        Self {
            hour: day * 24 + i64::from(local.hour()),
            day,
            week: day - i64::from(date.weekday().num_days_from_monday()),
        }
    }
}

impl WindowCounters {
    fn increment(&mut self, keys: WindowKeys) {
        *self.hours.entry(keys.hour).or_insert(0) += 1;
        *self.days.entry(keys.day).or_insert(0) += 1;
        *self.weeks.entry(keys.week).or_insert(0) += 1;
    }

    fn get(&self, keys: WindowKeys) -> WindowCounts {
        WindowCounts {
            hourly: self.hours.get(&keys.hour).copied().unwrap_or(0),
            daily: self.days.get(&keys.day).copied().unwrap_or(0),
            weekly: self.weeks.get(&keys.week).copied().unwrap_or(0),
        }
    }

    /// Drop entries that ended before `cutoff_day`; returns how many went
    fn purge_before(&mut self, cutoff_day: i64) -> usize {
        let before = self.len();
        self.days = self.days.split_off(&cutoff_day);
        self.hours = self.hours.split_off(&(cutoff_day * 24));
        self.weeks = self.weeks.split_off(&(cutoff_day - 6));
        before - self.len()
    }

    fn len(&self) -> usize {
        self.hours.len() + self.days.len() + self.weeks.len()
    }
}

/// Counts for the windows containing one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub hourly: u32,
    pub daily: u32,
    pub weekly: u32,
}

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    #[serde(with = "crate::types::duration_ms")]
    pub backoff: Duration,
    pub open: bool,
    pub open_until: Option<DateTime<Utc>>,
}

impl CircuitState {
    fn closed(backoff: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            backoff,
            open: false,
            open_until: None,
        }
    }
}

/// Exportable limiter state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterSnapshot {
    pub counters: WindowCounters,
    pub circuit: CircuitState,
    pub total_failures: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

struct Inner<R> {
    state: LimiterSnapshot,
    rng: R,
}

/// Multi-window limiter with exponential backoff and a circuit breaker
pub struct AdaptiveRateLimiter<R: Rng = StdRng> {
    name: String,
    ceilings: RateCeilings,
    policy: BreakerPolicy,
    timezone: Tz,
    inner: Mutex<Inner<R>>,
}

impl AdaptiveRateLimiter<StdRng> {
    pub fn seeded(
        name: impl Into<String>,
        ceilings: RateCeilings,
        timezone: Tz,
        seed: u64,
    ) -> Result<Self, GovernError> {
        Self::new(name, ceilings, timezone, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(
        name: impl Into<String>,
        ceilings: RateCeilings,
        timezone: Tz,
    ) -> Result<Self, GovernError> {
        Self::new(name, ceilings, timezone, StdRng::from_os_rng())
    }
}

impl<R: Rng> AdaptiveRateLimiter<R> {
    pub fn new(
        name: impl Into<String>,
        ceilings: RateCeilings,
        timezone: Tz,
        rng: R,
    ) -> Result<Self, GovernError> {
        let name = name.into();
        ceilings.validate(&name)?;
        let policy = BreakerPolicy::default();
        Ok(Self {
            name,
            ceilings,
            policy,
            timezone,
            inner: Mutex::new(Inner {
                state: LimiterSnapshot {
                    counters: WindowCounters::default(),
                    circuit: CircuitState::closed(policy.backoff_floor),
                    total_failures: 0,
                    last_failure_at: None,
                },
                rng,
            }),
        })
    }

    /// Replace the breaker tuning; the backoff restarts at the new floor
    pub fn with_policy(mut self, policy: BreakerPolicy) -> Result<Self, GovernError> {
        if policy.backoff_floor > policy.backoff_cap
            || policy.failure_threshold == 0
            || policy.retention_days < 1
            || !(0.0..1.0).contains(&policy.jitter)
        {
            return Err(GovernError::InvalidLimit(format!(
                "{}: invalid breaker policy {policy:?}",
                self.name
            )));
        }
        self.policy = policy;
        self.lock().state.circuit.backoff = policy.backoff_floor;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ceilings(&self) -> RateCeilings {
        self.ceilings
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an action may be sent at `now`
    ///
    /// Does not count anything. The only state change is closing a breaker
    /// whose open period has elapsed, which repeated calls cannot undo or redo.
    pub fn can_send(&self, now: DateTime<Utc>) -> Admission {
        let mut inner = self.lock();
        let circuit = &mut inner.state.circuit;

        if circuit.open {
            match circuit.open_until {
                Some(until) if now < until => {
                    let retry_after = (until - now).to_std().unwrap_or_default();
                    debug!(
                        limiter = %self.name,
                        retry_secs = retry_after.as_secs(),
                        "circuit breaker open"
                    );
                    return Admission::Rejected(Rejection {
                        reason: RejectReason::CircuitOpen,
                        retry_after,
                    });
                }
                _ => {
                    circuit.open = false;
                    circuit.open_until = None;
                    circuit.consecutive_failures = 0;
                    info!(limiter = %self.name, "circuit breaker closed");
                }
            }
        }

        let keys = WindowKeys::at(self.timezone, now);
        let counts = inner.state.counters.get(keys);

        let reason = if counts.hourly >= self.ceilings.hourly {
            Some(RejectReason::HourlyLimit)
        } else if counts.daily >= self.ceilings.daily {
            Some(RejectReason::DailyLimit)
        } else if self.ceilings.weekly.is_some_and(|w| counts.weekly >= w) {
            Some(RejectReason::WeeklyLimit)
        } else {
            None
        };

        match reason {
            None => Admission::Allowed,
            Some(reason) => {
                let retry_after = self.window_reset(reason, now);
                debug!(limiter = %self.name, ?reason, ?counts, "rate ceiling reached");
                Admission::Rejected(Rejection {
                    reason,
                    retry_after,
                })
            }
        }
    }

    /// Time until the window behind `reason` rolls over
    fn window_reset(&self, reason: RejectReason, now: DateTime<Utc>) -> Duration {
        let local = now.with_timezone(&self.timezone);
        let date = local.date_naive();
        let next_start = match reason {
            RejectReason::CircuitOpen => return Duration::ZERO,
            RejectReason::HourlyLimit => {
                return Duration::from_secs(
                    3_600 - u64::from(local.minute() * 60 + local.second()),
                );
            }
            RejectReason::DailyLimit => date.succ_opt(),
            RejectReason::WeeklyLimit => date.checked_add_signed(ChronoDuration::days(
                7 - i64::from(date.weekday().num_days_from_monday()),
            )),
        };
        next_start
            .and_then(|d| self.local_midnight(d))
            .and_then(|start| (start - now).to_std().ok())
            .unwrap_or_default()
    }

    fn local_midnight(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(0, 0, 0)?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Count a sent action in every window containing `now`
    pub fn record_success(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();
        let keys = WindowKeys::at(self.timezone, now);
        let state = &mut inner.state;

        state.counters.increment(keys);
        state.circuit.consecutive_failures = 0;
        state.circuit.backoff = self.policy.backoff_floor;

        let purged = state
            .counters
            .purge_before(keys.day - self.policy.retention_days);
        if purged > 0 {
            debug!(limiter = %self.name, purged, "expired window counters removed");
        }
    }

    /// Register a failed action and grow the backoff
    pub fn record_failure(&self, now: DateTime<Utc>, cause: impl fmt::Display) {
        let mut inner = self.lock();
        let state = &mut inner.state;
        let circuit = &mut state.circuit;

        state.total_failures += 1;
        state.last_failure_at = Some(now);
        circuit.consecutive_failures += 1;
        circuit.backoff = (circuit.backoff * 2).min(self.policy.backoff_cap);

        warn!(
            limiter = %self.name,
            %cause,
            consecutive = circuit.consecutive_failures,
            backoff_secs = circuit.backoff.as_secs(),
            "action failed"
        );

        if circuit.consecutive_failures >= self.policy.failure_threshold {
            let until = ChronoDuration::from_std(self.policy.open_duration)
                .map(|d| now + d)
                .unwrap_or(now);
            if !circuit.open {
                warn!(limiter = %self.name, open_until = %until, "circuit breaker opened");
            }
            circuit.open = true;
            circuit.open_until = Some(until);
        }
    }

    /// Current backoff, without jitter
    pub fn backoff_duration(&self) -> Duration {
        self.lock().state.circuit.backoff
    }

    /// Current backoff with ±jitter applied
    pub fn jittered_backoff(&self) -> Duration {
        let mut inner = self.lock();
        let backoff = inner.state.circuit.backoff;
        let j = self.policy.jitter;
        let factor = 1.0 + inner.rng.random_range(-j..=j);
        backoff.mul_f64(factor)
    }

    /// Sleep for the jittered backoff; returns how long was slept
    pub async fn wait(&self, token: &CancellationToken) -> Result<Duration, GovernError> {
        let delay = self.jittered_backoff();
        debug!(limiter = %self.name, delay_ms = delay.as_millis() as u64, "backing off");
        sleep_cancellable(delay, token).await?;
        Ok(delay)
    }

    /// Clear today's daily counter; hourly and weekly counters are untouched
    pub fn reset_daily(&self, now: DateTime<Utc>) {
        let keys = WindowKeys::at(self.timezone, now);
        self.lock().state.counters.days.remove(&keys.day);
        info!(limiter = %self.name, "daily counter reset");
    }

    pub fn counts(&self, now: DateTime<Utc>) -> WindowCounts {
        self.lock()
            .state
            .counters
            .get(WindowKeys::at(self.timezone, now))
    }

    pub fn circuit(&self) -> CircuitState {
        self.lock().state.circuit
    }

    pub fn total_failures(&self) -> u64 {
        self.lock().state.total_failures
    }

    pub fn last_failure_at(&self) -> Option<DateTime<Utc>> {
        self.lock().state.last_failure_at
    }

    /// Copy of counters and breaker state, for hosts that persist them
    pub fn snapshot(&self) -> LimiterSnapshot {
        self.lock().state.clone()
    }

    pub fn restore(&self, snapshot: LimiterSnapshot) {
        self.lock().state = snapshot;
        info!(limiter = %self.name, "limiter state restored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn limiter(hourly: u32, daily: u32, weekly: Option<u32>) -> AdaptiveRateLimiter {
        AdaptiveRateLimiter::seeded(
            "test",
            RateCeilings {
                hourly,
                daily,
                weekly,
            },
            Tz::UTC,
            7,
        )
        .unwrap()
    }

    #[test]
    fn test_hourly_ceiling() {
        let l = limiter(2, 50, Some(200));
        let now = at(2024, 1, 15, 10, 15);
        assert!(l.can_send(now).is_allowed());
        l.record_success(now);
        l.record_success(now);

        let admission = l.can_send(at(2024, 1, 15, 10, 30));
        let rejection = admission.rejection().unwrap();
        assert_eq!(rejection.reason, RejectReason::HourlyLimit);
        assert_eq!(rejection.retry_after, Duration::from_secs(30 * 60));
        assert!(rejection.to_string().contains("hourly"));

        assert!(l.can_send(at(2024, 1, 15, 11, 0)).is_allowed());
    }

    #[test]
    fn test_daily_and_weekly_ceilings() {
        let l = limiter(10, 3, Some(5));
        for h in 9..12 {
            l.record_success(at(2024, 1, 15, h, 0));
        }
        let daily = l.can_send(at(2024, 1, 15, 14, 0));
        assert_eq!(daily.rejection().unwrap().reason, RejectReason::DailyLimit);
        assert_eq!(
            daily.rejection().unwrap().retry_after,
            Duration::from_secs(10 * 3600)
        );

        l.record_success(at(2024, 1, 16, 9, 0));
        l.record_success(at(2024, 1, 16, 10, 0));
        let weekly = l.can_send(at(2024, 1, 17, 9, 0));
        assert_eq!(weekly.rejection().unwrap().reason, RejectReason::WeeklyLimit);
        // Next Monday is 2024-01-22
        assert_eq!(
            weekly.rejection().unwrap().retry_after,
            (at(2024, 1, 22, 0, 0) - at(2024, 1, 17, 9, 0)).to_std().unwrap()
        );

        // New ISO week
        assert!(l.can_send(at(2024, 1, 22, 9, 0)).is_allowed());
    }

    #[test]
    fn test_unbounded_week() {
        let l = limiter(100, 100, None);
        for d in 15..20 {
            for h in 9..14 {
                l.record_success(at(2024, 1, d, h, 0));
            }
        }
        assert_eq!(l.counts(at(2024, 1, 19, 15, 0)).weekly, 25);
        assert!(l.can_send(at(2024, 1, 19, 15, 0)).is_allowed());
    }

    #[test]
    fn test_can_send_does_not_count() {
        let l = limiter(2, 50, Some(200));
        let now = at(2024, 1, 15, 10, 0);
        l.record_success(now);
        let before = l.snapshot();
        for _ in 0..10 {
            assert!(l.can_send(now).is_allowed());
        }
        assert_eq!(l.snapshot(), before);
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let l = limiter(10, 50, None);
        let now = at(2024, 1, 15, 10, 0);
        assert_eq!(l.backoff_duration(), Duration::from_secs(30));

        let expected = [60, 120, 240, 300, 300];
        for secs in expected {
            l.record_failure(now, "timeout");
            assert_eq!(l.backoff_duration(), Duration::from_secs(secs));
        }
        assert_eq!(l.total_failures(), 5);
        assert_eq!(l.last_failure_at(), Some(now));

        l.record_success(now);
        assert_eq!(l.backoff_duration(), Duration::from_secs(30));
        assert_eq!(l.circuit().consecutive_failures, 0);
    }

    #[test]
    fn test_breaker_opens_and_closes() {
        let l = limiter(10, 50, None);
        let t0 = at(2024, 1, 15, 10, 0);
        l.record_failure(t0, "http 429");
        l.record_failure(t0, "http 429");
        assert!(!l.circuit().open);
        l.record_failure(t0, "http 429");
        assert!(l.circuit().open);

        let admission = l.can_send(t0 + ChronoDuration::minutes(10));
        let rejection = admission.rejection().unwrap();
        assert_eq!(rejection.reason, RejectReason::CircuitOpen);
        assert_eq!(rejection.retry_after, Duration::from_secs(50 * 60));
        assert!(rejection.to_string().contains("breaker"));

        let later = t0 + ChronoDuration::hours(1);
        assert!(l.can_send(later).is_allowed());
        let circuit = l.circuit();
        assert!(!circuit.open);
        assert_eq!(circuit.consecutive_failures, 0);
        assert_eq!(l.total_failures(), 3);

        // Closing is idempotent
        let after_close = l.snapshot();
        assert!(l.can_send(later).is_allowed());
        assert_eq!(l.snapshot(), after_close);
    }

    #[test]
    fn test_breaker_rearmed_by_later_failure() {
        let l = limiter(10, 50, None);
        let t0 = at(2024, 1, 15, 10, 0);
        for _ in 0..3 {
            l.record_failure(t0, "blocked");
        }
        let t1 = t0 + ChronoDuration::minutes(30);
        l.record_failure(t1, "blocked");
        assert_eq!(l.circuit().open_until, Some(t1 + ChronoDuration::hours(1)));
    }

    #[test]
    fn test_old_counters_purged() {
        let l = limiter(10, 50, None);
        l.record_success(at(2024, 1, 1, 10, 0));
        assert_eq!(l.snapshot().counters.len(), 3);
        l.record_success(at(2024, 2, 15, 10, 0));
        let snap = l.snapshot();
        assert_eq!(snap.counters.len(), 3);
        assert_eq!(l.counts(at(2024, 1, 1, 10, 0)), WindowCounts::default());
    }

    #[test]
    fn test_reset_daily_keeps_other_windows() {
        let l = limiter(10, 2, None);
        let now = at(2024, 1, 15, 10, 0);
        l.record_success(now);
        l.record_success(now);
        assert!(!l.can_send(now).is_allowed());
        l.reset_daily(now);
        assert_eq!(
            l.counts(now),
            WindowCounts {
                hourly: 2,
                daily: 0,
                weekly: 2,
            }
        );
        assert!(l.can_send(now).is_allowed());
    }

    #[test]
    fn test_snapshot_restore() {
        let l = limiter(10, 50, None);
        let now = at(2024, 1, 15, 10, 0);
        l.record_success(now);
        l.record_failure(now, "reset by peer");
        let json = serde_json::to_string(&l.snapshot()).unwrap();

        let fresh = limiter(10, 50, None);
        fresh.restore(serde_json::from_str(&json).unwrap());
        assert_eq!(fresh.snapshot(), l.snapshot());
        assert_eq!(fresh.counts(now).daily, 1);
        assert_eq!(fresh.backoff_duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_timezone_shifts_day_window() {
        let l = AdaptiveRateLimiter::seeded(
            "ny",
            RateCeilings {
                hourly: 10,
                daily: 1,
                weekly: None,
            },
            chrono_tz::America::New_York,
            1,
        )
        .unwrap();
        // 03:00 UTC on the 16th is still the 15th in New York
        l.record_success(at(2024, 1, 16, 3, 0));
        assert!(!l.can_send(at(2024, 1, 15, 20, 0)).is_allowed());
        assert!(l.can_send(at(2024, 1, 16, 6, 0)).is_allowed());
    }

    #[test]
    fn test_concurrent_records() {
        let l = Arc::new(limiter(1_000, 1_000, None));
        let now = at(2024, 1, 15, 10, 0);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = Arc::clone(&l);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        l.record_success(now);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(
            l.counts(now),
            WindowCounts {
                hourly: 200,
                daily: 200,
                weekly: 200,
            }
        );
    }

    #[test]
    fn test_invalid_ceilings() {
        let err = AdaptiveRateLimiter::seeded(
            "zero",
            RateCeilings {
                hourly: 0,
                daily: 5,
                weekly: None,
            },
            Tz::UTC,
            1,
        );
        assert!(matches!(err, Err(GovernError::InvalidLimit(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_applies_jitter() {
        let l = limiter(10, 50, None);
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let slept = l.wait(&token).await.unwrap();
        assert!(slept >= Duration::from_secs(24) && slept <= Duration::from_secs(36));
        let elapsed = start.elapsed();
        assert!(elapsed >= slept && elapsed <= slept + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cancelled() {
        let l = limiter(10, 50, None);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(l.wait(&token).await, Err(GovernError::Cancelled)));
    }
}
