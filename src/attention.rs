//! Attention model
//!
//! Non-task-directed pointer behavior played between real actions: hovering an
//! interactive element, wandering the cursor while idle, and tracing a line of
//! text as if reading it. Each plan chains motion trajectories from the current
//! pointer position and interleaves dwell pauses.
//!
//! Locating candidate elements is the caller's job; these planners take the
//! bounding boxes it found.

use crate::error::GovernError;
use crate::motion::{check_probability, MotionConfig, MotionSynthesizer};
use crate::timing::{symmetric, uniform_millis};
use crate::types::{AttentionAction, AttentionKind, AttentionPlan, BoundingBox, Point, Viewport};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const HOVER_DWELL_MS: (u64, u64) = (500, 2500);

const READING_STEPS: (usize, usize) = (5, 9);
const READING_STEP_MS: (u64, u64) = (300, 700);
const READING_LINE_JITTER_PX: f64 = 5.0;

/// Idle-behavior tuning, the `behavior` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub random_hover_probability: f64,
    pub idle_movement_probability: f64,
    pub reading_pattern_probability: f64,
    /// Max offset from an element's center when hovering it (px)
    pub hover_jitter_px: f64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            random_hover_probability: 0.1,
            idle_movement_probability: 0.05,
            reading_pattern_probability: 0.05,
            hover_jitter_px: 10.0,
        }
    }
}

impl BehaviorConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        check_probability(
            "behavior.random_hover_probability",
            self.random_hover_probability,
        )?;
        check_probability(
            "behavior.idle_movement_probability",
            self.idle_movement_probability,
        )?;
        check_probability(
            "behavior.reading_pattern_probability",
            self.reading_pattern_probability,
        )?;
        if !self.hover_jitter_px.is_finite() || self.hover_jitter_px < 0.0 {
            return Err(GovernError::Config(format!(
                "behavior.hover_jitter_px must be a non-negative number, got {}",
                self.hover_jitter_px
            )));
        }
        Ok(())
    }
}

/// Planner for hover, idle-wander and reading behaviors
pub struct AttentionModel<R: Rng = StdRng> {
    config: BehaviorConfig,
    motion: MotionSynthesizer<R>,
    rng: R,
}

impl AttentionModel<StdRng> {
    pub fn seeded(
        config: BehaviorConfig,
        motion: MotionConfig,
        seed: u64,
    ) -> Result<Self, GovernError> {
        let motion = MotionSynthesizer::seeded(motion, seed.wrapping_add(1))?;
        Self::new(config, motion, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(config: BehaviorConfig, motion: MotionConfig) -> Result<Self, GovernError> {
        let motion = MotionSynthesizer::from_os_rng(motion)?;
        Self::new(config, motion, StdRng::from_os_rng())
    }
}

impl<R: Rng> AttentionModel<R> {
    pub fn new(
        config: BehaviorConfig,
        motion: MotionSynthesizer<R>,
        rng: R,
    ) -> Result<Self, GovernError> {
        config.validate()?;
        Ok(Self {
            config,
            motion,
            rng,
        })
    }

    /// Roll for an idle behavior to interleave, if any
    ///
    /// Hover is rolled first, then idle wandering, then reading.
    pub fn pick_behavior(&mut self) -> Option<AttentionKind> {
        if self.rng.random_bool(self.config.random_hover_probability) {
            Some(AttentionKind::Hover)
        } else if self.rng.random_bool(self.config.idle_movement_probability) {
            Some(AttentionKind::IdleWander)
        } else if self.rng.random_bool(self.config.reading_pattern_probability) {
            Some(AttentionKind::Reading)
        } else {
            None
        }
    }

    /// Move onto `target` near its center and linger for 0.5-2.5 s
    pub fn plan_hover(&mut self, from: Point, target: BoundingBox) -> AttentionPlan {
        let spread = self.config.hover_jitter_px;
        let dx = symmetric(&mut self.rng, spread);
        let dy = symmetric(&mut self.rng, spread);
        let point = target.center().offset(dx, dy);

        let trajectory = self.motion.plan_motion(from, point);
        let duration = uniform_millis(&mut self.rng, HOVER_DWELL_MS.0, HOVER_DWELL_MS.1);

        AttentionPlan {
            kind: AttentionKind::Hover,
            actions: vec![
                AttentionAction::Move { trajectory },
                AttentionAction::Dwell { duration },
            ],
        }
    }

    /// Hover one of `candidates` at random; `None` when there is nothing to hover
    pub fn plan_random_hover(
        &mut self,
        from: Point,
        candidates: &[BoundingBox],
    ) -> Option<AttentionPlan> {
        if candidates.is_empty() {
            return None;
        }
        let target = candidates[self.rng.random_range(0..candidates.len())];
        Some(self.plan_hover(from, target))
    }

    /// Drift the cursor to a random point inside the viewport
    pub fn plan_idle_wander(&mut self, from: Point, viewport: Viewport) -> AttentionPlan {
        let x = self.rng.random::<f64>() * viewport.width.max(0.0);
        let y = self.rng.random::<f64>() * viewport.height.max(0.0);
        let trajectory = self.motion.plan_motion(from, Point::new(x, y));

        AttentionPlan {
            kind: AttentionKind::IdleWander,
            actions: vec![AttentionAction::Move { trajectory }],
        }
    }

    /// Walk the cursor left to right across a text block in 5-9 steps
    pub fn plan_reading(&mut self, from: Point, text: BoundingBox) -> AttentionPlan {
        let steps = self.rng.random_range(READING_STEPS.0..=READING_STEPS.1);
        let mut actions = Vec::with_capacity(steps * 2);
        let mut cursor = from;

        for i in 0..steps {
            let progress = i as f64 / steps as f64;
            let pos = Point::new(
                text.x + text.width * progress,
                text.y + text.height * 0.5 + symmetric(&mut self.rng, READING_LINE_JITTER_PX),
            );

            let trajectory = self.motion.plan_motion(cursor, pos);
            cursor = pos;
            actions.push(AttentionAction::Move { trajectory });
            actions.push(AttentionAction::Dwell {
                duration: uniform_millis(&mut self.rng, READING_STEP_MS.0, READING_STEP_MS.1),
            });
        }

        AttentionPlan {
            kind: AttentionKind::Reading,
            actions,
        }
    }
}
