//! Governance engine facade
//!
//! A [`Governor`] is built once per run and owns one of every component: the
//! synthesizers, the attention model, the operating schedule, a rate limiter per
//! action stream and the dedup filter. The orchestration layer talks only to
//! this type.

use crate::attention::AttentionModel;
use crate::bloom::BloomFilter;
use crate::cancel::CancellationToken;
use crate::clock::{Clock, SystemClock};
use crate::config::GovernorConfig;
use crate::error::GovernError;
use crate::keystroke::KeystrokeSynthesizer;
use crate::limiter::{ActionKind, AdaptiveRateLimiter, Admission, LimiterSnapshot};
use crate::motion::MotionSynthesizer;
use crate::schedule::{OperatingSchedule, ScheduleStatus};
use crate::scroll::ScrollSynthesizer;
use crate::timing::TimingProfile;
use crate::types::{
    AttentionKind, AttentionPlan, BoundingBox, Point, ScrollPlan, Trajectory, TypingPlan, Viewport,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Offsets added to the configured seed so components draw independent streams
mod seed_offset {
    pub const TIMING: u64 = 0;
    pub const MOTION: u64 = 1;
    pub const KEYSTROKE: u64 = 2;
    pub const SCROLL: u64 = 3;
    pub const ATTENTION: u64 = 4;
    pub const SCHEDULE: u64 = 6;
    pub const LIMITER: u64 = 7;
}

fn rng_for(seed: Option<u64>, offset: u64) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(offset)),
        None => StdRng::from_os_rng(),
    }
}

/// Behavioral simulation and governance engine for one run
pub struct Governor {
    run_id: Uuid,
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    timing: TimingProfile,
    timing_rng: StdRng,
    motion: MotionSynthesizer,
    keystroke: KeystrokeSynthesizer,
    scroll: ScrollSynthesizer,
    attention: AttentionModel,
    schedule: OperatingSchedule,
    connection_requests: Arc<AdaptiveRateLimiter>,
    messages: Arc<AdaptiveRateLimiter>,
    seen: BloomFilter,
}

impl fmt::Debug for Governor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Governor")
            .field("run_id", &self.run_id)
            .field("seen", &self.seen.inserted())
            .finish_non_exhaustive()
    }
}

impl Governor {
    /// Build every component from `config` using the system clock
    pub fn new(config: GovernorConfig) -> Result<Self, GovernError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GovernorConfig, clock: Arc<dyn Clock>) -> Result<Self, GovernError> {
        let seed = config.seed;
        let timing = config.timing.profile()?;

        let motion = MotionSynthesizer::new(config.mouse, rng_for(seed, seed_offset::MOTION))?;
        let keystroke =
            KeystrokeSynthesizer::new(config.typing, rng_for(seed, seed_offset::KEYSTROKE))?;
        let scroll =
            ScrollSynthesizer::new(config.scroll, timing, rng_for(seed, seed_offset::SCROLL))?;
        let attention = AttentionModel::new(
            config.behavior,
            MotionSynthesizer::new(config.mouse, rng_for(seed, seed_offset::ATTENTION + 1))?,
            rng_for(seed, seed_offset::ATTENTION),
        )?;
        let schedule =
            OperatingSchedule::new(&config.schedule, rng_for(seed, seed_offset::SCHEDULE))?;

        let tz = schedule.window().timezone();
        let limiter = |kind: ActionKind, offset: u64| {
            AdaptiveRateLimiter::new(
                kind.to_string(),
                config.limits.ceilings_for(kind),
                tz,
                rng_for(seed, seed_offset::LIMITER + offset),
            )
            .map(Arc::new)
        };
        let connection_requests = limiter(ActionKind::ConnectionRequest, 0)?;
        let messages = limiter(ActionKind::Message, 1)?;

        let seen = BloomFilter::from_config(&config.dedup)?;
        let run_id = Uuid::new_v4();

        info!(
            %run_id,
            timezone = %tz,
            seeded = seed.is_some(),
            filter_bits = seen.bit_len(),
            "governor ready"
        );

        Ok(Self {
            run_id,
            timing_rng: rng_for(seed, seed_offset::TIMING),
            config,
            clock,
            timing,
            motion,
            keystroke,
            scroll,
            attention,
            schedule,
            connection_requests,
            messages,
            seen,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    // Timing

    /// Delay before the next deliberate action, within the configured bounds
    pub fn action_delay(&mut self) -> Duration {
        self.timing.random_delay(&mut self.timing_rng)
    }

    pub fn think_time(&mut self) -> Duration {
        self.timing.think_time(&mut self.timing_rng)
    }

    pub fn read_time(&mut self, word_count: u32) -> Duration {
        self.timing.read_time(&mut self.timing_rng, word_count)
    }

    pub fn page_load_wait(&mut self) -> Duration {
        self.timing.page_load_wait(&mut self.timing_rng)
    }

    pub fn typing_pause(&mut self) -> Duration {
        self.timing.typing_pause(&mut self.timing_rng)
    }

    // Synthesis

    pub fn plan_motion(&mut self, start: Point, target: Point) -> Trajectory {
        self.motion.plan_motion(start, target)
    }

    pub fn plan_typing(&mut self, text: &str) -> TypingPlan {
        self.keystroke.plan_typing(text)
    }

    pub fn plan_typing_at(&mut self, text: &str, wpm: u32) -> TypingPlan {
        self.keystroke.plan_typing_at(text, wpm)
    }

    pub fn plan_with_corrections(&mut self, text: &str) -> TypingPlan {
        self.keystroke.plan_with_corrections(text)
    }

    pub fn plan_scroll(&mut self, distance: u32) -> ScrollPlan {
        self.scroll.plan_scroll(distance)
    }

    pub fn plan_random_scroll(&mut self) -> ScrollPlan {
        self.scroll.plan_random_scroll()
    }

    pub fn plan_scroll_to(&mut self, current_offset: f64, element_top: f64) -> ScrollPlan {
        self.scroll.plan_scroll_to(current_offset, element_top)
    }

    pub fn should_hover_while_scrolling(&mut self) -> bool {
        self.scroll.should_hover()
    }

    // Attention

    pub fn pick_behavior(&mut self) -> Option<AttentionKind> {
        self.attention.pick_behavior()
    }

    pub fn plan_hover(&mut self, from: Point, target: BoundingBox) -> AttentionPlan {
        self.attention.plan_hover(from, target)
    }

    pub fn plan_random_hover(
        &mut self,
        from: Point,
        candidates: &[BoundingBox],
    ) -> Option<AttentionPlan> {
        self.attention.plan_random_hover(from, candidates)
    }

    pub fn plan_idle_wander(&mut self, from: Point, viewport: Viewport) -> AttentionPlan {
        self.attention.plan_idle_wander(from, viewport)
    }

    pub fn plan_reading(&mut self, from: Point, text: BoundingBox) -> AttentionPlan {
        self.attention.plan_reading(from, text)
    }

    // Schedule

    pub fn should_operate(&self) -> bool {
        self.schedule.should_operate(self.clock.now())
    }

    pub fn schedule_status(&self) -> ScheduleStatus {
        self.schedule.status(self.clock.now())
    }

    pub async fn wait_until_operating(&self, token: &CancellationToken) -> Result<(), GovernError> {
        self.schedule
            .wait_until_operating(self.clock.as_ref(), token)
            .await
    }

    pub fn random_work_duration(&mut self) -> Duration {
        self.schedule.random_work_duration()
    }

    pub fn break_duration(&mut self) -> Duration {
        self.schedule.break_duration()
    }

    // Rate limiting

    /// Shared handle to the limiter for one action stream
    pub fn limiter(&self, kind: ActionKind) -> &Arc<AdaptiveRateLimiter> {
        match kind {
            ActionKind::ConnectionRequest => &self.connection_requests,
            ActionKind::Message => &self.messages,
        }
    }

    pub fn can_send(&self, kind: ActionKind) -> Admission {
        self.limiter(kind).can_send(self.clock.now())
    }

    pub fn record_success(&self, kind: ActionKind) {
        self.limiter(kind).record_success(self.clock.now())
    }

    pub fn record_failure(&self, kind: ActionKind, cause: impl fmt::Display) {
        self.limiter(kind).record_failure(self.clock.now(), cause)
    }

    pub fn backoff_duration(&self, kind: ActionKind) -> Duration {
        self.limiter(kind).backoff_duration()
    }

    pub async fn wait_backoff(
        &self,
        kind: ActionKind,
        token: &CancellationToken,
    ) -> Result<Duration, GovernError> {
        self.limiter(kind).wait(token).await
    }

    pub fn reset_daily(&self, kind: ActionKind) {
        self.limiter(kind).reset_daily(self.clock.now())
    }

    /// Serialize every limiter's counters and breaker state
    pub fn save_limits(&self) -> Result<String, GovernError> {
        let snapshots: BTreeMap<ActionKind, LimiterSnapshot> = ActionKind::ALL
            .iter()
            .map(|kind| (*kind, self.limiter(*kind).snapshot()))
            .collect();
        Ok(serde_json::to_string(&snapshots)?)
    }

    /// Restore limiter state saved by [`Governor::save_limits`]
    ///
    /// Streams missing from `json` keep their current state.
    pub fn load_limits(&self, json: &str) -> Result<(), GovernError> {
        let snapshots: BTreeMap<ActionKind, LimiterSnapshot> = serde_json::from_str(json)?;
        for (kind, snapshot) in snapshots {
            self.limiter(kind).restore(snapshot);
        }
        Ok(())
    }

    // Dedup

    /// Remember `key`; returns false when it was (probably) seen before
    pub fn mark_seen(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.add(key);
        true
    }

    pub fn is_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn seen_filter(&self) -> &BloomFilter {
        &self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::limiter::RejectReason;
    use crate::schedule::IdleReason;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn seeded_config(seed: u64) -> GovernorConfig {
        GovernorConfig {
            seed: Some(seed),
            ..GovernorConfig::default()
        }
    }

    fn monday_morning() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
        ))
    }

    #[test]
    fn test_seeded_governors_agree() {
        let mut a = Governor::with_clock(seeded_config(11), monday_morning()).unwrap();
        let mut b = Governor::with_clock(seeded_config(11), monday_morning()).unwrap();

        let from = Point::new(10.0, 10.0);
        let to = Point::new(500.0, 300.0);
        assert_eq!(a.plan_motion(from, to), b.plan_motion(from, to));
        assert_eq!(a.plan_typing("hello"), b.plan_typing("hello"));
        assert_eq!(a.plan_scroll(400), b.plan_scroll(400));
        assert_eq!(a.action_delay(), b.action_delay());
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_action_delay_in_bounds() {
        let mut g = Governor::with_clock(seeded_config(1), monday_morning()).unwrap();
        for _ in 0..200 {
            let d = g.action_delay();
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(8));
        }
    }

    #[test]
    fn test_schedule_uses_clock() {
        let clock = monday_morning();
        let g = Governor::with_clock(seeded_config(2), clock.clone()).unwrap();
        assert!(g.should_operate());

        clock.set(Utc.with_ymd_and_hms(2024, 1, 13, 10, 0, 0).unwrap());
        assert_eq!(
            g.schedule_status(),
            ScheduleStatus::Idle {
                reason: IdleReason::NotWorkday
            }
        );
    }

    #[test]
    fn test_streams_limited_independently() {
        let clock = monday_morning();
        let g = Governor::with_clock(seeded_config(3), clock.clone()).unwrap();

        for _ in 0..5 {
            assert!(g.can_send(ActionKind::Message).is_allowed());
            g.record_success(ActionKind::Message);
        }
        let admission = g.can_send(ActionKind::Message);
        assert_eq!(
            admission.rejection().map(|r| r.reason),
            Some(RejectReason::HourlyLimit)
        );
        assert!(g.can_send(ActionKind::ConnectionRequest).is_allowed());

        clock.advance(ChronoDuration::hours(1));
        assert!(g.can_send(ActionKind::Message).is_allowed());
    }

    #[test]
    fn test_failures_open_breaker() {
        let g = Governor::with_clock(seeded_config(4), monday_morning()).unwrap();
        for _ in 0..3 {
            g.record_failure(ActionKind::ConnectionRequest, "http 429");
        }
        let admission = g.can_send(ActionKind::ConnectionRequest);
        assert_eq!(
            admission.rejection().map(|r| r.reason),
            Some(RejectReason::CircuitOpen)
        );
        assert_eq!(
            g.backoff_duration(ActionKind::ConnectionRequest),
            Duration::from_secs(240)
        );
        assert!(g.can_send(ActionKind::Message).is_allowed());
    }

    #[test]
    fn test_limits_round_trip_through_json() {
        let g = Governor::with_clock(seeded_config(5), monday_morning()).unwrap();
        g.record_success(ActionKind::ConnectionRequest);
        g.record_success(ActionKind::ConnectionRequest);
        g.record_failure(ActionKind::Message, "timeout");
        let saved = g.save_limits().unwrap();

        let restored = Governor::with_clock(seeded_config(6), monday_morning()).unwrap();
        restored.load_limits(&saved).unwrap();
        let now = restored.now();
        assert_eq!(
            restored
                .limiter(ActionKind::ConnectionRequest)
                .counts(now)
                .daily,
            2
        );
        assert_eq!(restored.limiter(ActionKind::Message).total_failures(), 1);
    }

    #[test]
    fn test_mark_seen() {
        let mut g = Governor::with_clock(seeded_config(7), monday_morning()).unwrap();
        assert!(!g.is_seen("profile/123"));
        assert!(g.mark_seen("profile/123"));
        assert!(!g.mark_seen("profile/123"));
        assert!(g.is_seen("profile/123"));
        assert_eq!(g.seen_filter().inserted(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = seeded_config(8);
        config.schedule.timezone = "Atlantis/Capital".to_string();
        assert!(matches!(
            Governor::new(config),
            Err(GovernError::InvalidTimezone(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_operating_returns_when_open() {
        let g = Governor::with_clock(seeded_config(9), monday_morning()).unwrap();
        let token = CancellationToken::new();
        g.wait_until_operating(&token).await.unwrap();
    }
}
