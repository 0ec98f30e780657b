//! Scroll synthesis
//!
//! Splits a scroll distance into ~50 px wheel steps with an ease-in/ease-out
//! cadence, occasional small back-scrolls and the odd reading pause.

use crate::error::GovernError;
use crate::motion::check_probability;
use crate::timing::{uniform_millis, TimingProfile};
use crate::types::{ScrollKind, ScrollPlan, ScrollStep};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nominal wheel step (px)
pub const STEP_PX: i32 = 50;
const STEP_VARIATION_PX: i32 = 10;

/// Fraction of steps spent easing in and out
const RAMP_FRACTION: f64 = 0.2;

const BACK_SCROLL_PX: i32 = -10;
const BACK_SCROLL_DELAY: Duration = Duration::from_millis(200);
const PAUSE_MS: (u64, u64) = (500, 2000);

/// Idle browsing distance bounds (px, upper exclusive)
const RANDOM_SCROLL_PX: (u32, u32) = (200, 600);

/// Elements are brought to this many px below the top of the viewport
const ELEMENT_MARGIN_PX: f64 = 200.0;

/// Scroll tuning, the `scroll` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Chance of a small reverse correction after a step
    pub back_probability: f64,
    /// Chance of an extended pause after a step
    pub pause_probability: f64,
    /// Chance of hovering an element while scrolling through a page
    pub hover_probability: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            back_probability: 0.15,
            pause_probability: 0.1,
            hover_probability: 0.1,
        }
    }
}

impl ScrollConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        check_probability("scroll.back_probability", self.back_probability)?;
        check_probability("scroll.pause_probability", self.pause_probability)?;
        check_probability("scroll.hover_probability", self.hover_probability)
    }
}

/// Stepped scroll planner
pub struct ScrollSynthesizer<R: Rng = StdRng> {
    config: ScrollConfig,
    timing: TimingProfile,
    rng: R,
}

impl ScrollSynthesizer<StdRng> {
    pub fn seeded(
        config: ScrollConfig,
        timing: TimingProfile,
        seed: u64,
    ) -> Result<Self, GovernError> {
        Self::new(config, timing, StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng(config: ScrollConfig, timing: TimingProfile) -> Result<Self, GovernError> {
        Self::new(config, timing, StdRng::from_os_rng())
    }
}

impl<R: Rng> ScrollSynthesizer<R> {
    pub fn new(config: ScrollConfig, timing: TimingProfile, rng: R) -> Result<Self, GovernError> {
        config.validate()?;
        Ok(Self {
            config,
            timing,
            rng,
        })
    }

    pub fn config(&self) -> &ScrollConfig {
        &self.config
    }

    /// Plan a downward scroll of roughly `distance` px (at least one step)
    pub fn plan_scroll(&mut self, distance: u32) -> ScrollPlan {
        let total_steps = ((distance / STEP_PX as u32) as usize).max(1);
        let mut steps = Vec::with_capacity(total_steps + total_steps / 4);

        for i in 0..total_steps {
            let speed = scroll_speed(i, total_steps);
            let delta = STEP_PX + self.rng.random_range(-STEP_VARIATION_PX..=STEP_VARIATION_PX);
            steps.push(ScrollStep {
                delta,
                delay: Duration::from_micros((STEP_PX as f64 / speed * 1000.0).round() as u64),
                kind: ScrollKind::Step,
            });

            if self.rng.random_bool(self.config.back_probability) {
                steps.push(ScrollStep {
                    delta: BACK_SCROLL_PX,
                    delay: BACK_SCROLL_DELAY,
                    kind: ScrollKind::BackScroll,
                });
            }
            if self.rng.random_bool(self.config.pause_probability) {
                steps.push(ScrollStep {
                    delta: 0,
                    delay: uniform_millis(&mut self.rng, PAUSE_MS.0, PAUSE_MS.1),
                    kind: ScrollKind::Pause,
                });
            }
        }

        ScrollPlan { steps }
    }

    /// Plan an idle browsing scroll of 200-600 px
    pub fn plan_random_scroll(&mut self) -> ScrollPlan {
        let distance = self
            .rng
            .random_range(RANDOM_SCROLL_PX.0..RANDOM_SCROLL_PX.1);
        self.plan_scroll(distance)
    }

    /// Plan a scroll that brings an element near the top of the viewport
    ///
    /// `current_offset` is the page's vertical scroll position and `element_top`
    /// the element's absolute top. Returns an empty plan when the element is
    /// already above the anchor line.
    pub fn plan_scroll_to(&mut self, current_offset: f64, element_top: f64) -> ScrollPlan {
        let distance = element_top - ELEMENT_MARGIN_PX - current_offset;
        if distance < 1.0 {
            return ScrollPlan::default();
        }

        let think = self.timing.scroll_think_time(&mut self.rng);
        let mut plan = self.plan_scroll(distance as u32);
        plan.steps.insert(
            0,
            ScrollStep {
                delta: 0,
                delay: think,
                kind: ScrollKind::Think,
            },
        );
        plan
    }

    /// Whether to hover something while scrolling, per `hover_probability`
    pub fn should_hover(&mut self) -> bool {
        self.rng.random_bool(self.config.hover_probability)
    }
}

/// Relative wheel speed: 0.5 → 1.0 over the first 20% of steps, 1.0 → 0.5 over the last 20%
fn scroll_speed(step: usize, total_steps: usize) -> f64 {
    let progress = step as f64 / total_steps as f64;
    if progress < RAMP_FRACTION {
        0.5 + progress * 2.5
    } else if progress > 1.0 - RAMP_FRACTION {
        1.0 - (progress - (1.0 - RAMP_FRACTION)) * 2.5
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth(seed: u64) -> ScrollSynthesizer {
        ScrollSynthesizer::seeded(ScrollConfig::default(), TimingProfile::default(), seed).unwrap()
    }

    fn quiet() -> ScrollConfig {
        ScrollConfig {
            back_probability: 0.0,
            pause_probability: 0.0,
            hover_probability: 0.0,
        }
    }

    #[test]
    fn test_step_count() {
        let mut s = synth(1);
        assert_eq!(s.plan_scroll(500).forward_steps(), 10);
        assert_eq!(s.plan_scroll(549).forward_steps(), 10);
        assert_eq!(s.plan_scroll(20).forward_steps(), 1);
        assert_eq!(s.plan_scroll(0).forward_steps(), 1);
    }

    #[test]
    fn test_step_deltas_within_variation() {
        let mut s = synth(2);
        let plan = s.plan_scroll(5_000);
        for step in plan.steps.iter().filter(|s| s.kind == ScrollKind::Step) {
            assert!((40..=60).contains(&step.delta), "delta {}", step.delta);
        }
    }

    #[test]
    fn test_net_distance_close_to_request() {
        let mut s = ScrollSynthesizer::seeded(quiet(), TimingProfile::default(), 3).unwrap();
        let plan = s.plan_scroll(1_000);
        // 20 steps of 50 ± 10
        assert!((800..=1200).contains(&plan.net_distance()));
        assert_eq!(plan.steps.len(), 20);
    }

    #[test]
    fn test_cadence_eases_in_and_out() {
        let mut s = ScrollSynthesizer::seeded(quiet(), TimingProfile::default(), 4).unwrap();
        let plan = s.plan_scroll(1_000);
        let first = plan.steps[0].delay;
        let middle = plan.steps[10].delay;
        let last = plan.steps[19].delay;
        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(middle, Duration::from_millis(50));
        assert!(last > middle);
    }

    #[test]
    fn test_back_scroll_and_pause_shapes() {
        let config = ScrollConfig {
            back_probability: 1.0,
            pause_probability: 1.0,
            hover_probability: 0.0,
        };
        let mut s = ScrollSynthesizer::seeded(config, TimingProfile::default(), 5).unwrap();
        let plan = s.plan_scroll(100);
        let kinds: Vec<ScrollKind> = plan.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ScrollKind::Step,
                ScrollKind::BackScroll,
                ScrollKind::Pause,
                ScrollKind::Step,
                ScrollKind::BackScroll,
                ScrollKind::Pause,
            ]
        );
        let pause = plan.steps[2].delay;
        assert!(pause >= Duration::from_millis(500) && pause < Duration::from_secs(2));
        assert_eq!(plan.steps[1].delta, -10);
    }

    #[test]
    fn test_back_scroll_and_pause_rates() {
        let mut s = synth(8);
        let (mut forward, mut back, mut pause) = (0, 0, 0);
        for _ in 0..100 {
            let plan = s.plan_scroll(5_000);
            for step in &plan.steps {
                match step.kind {
                    ScrollKind::Step => forward += 1,
                    ScrollKind::BackScroll => back += 1,
                    ScrollKind::Pause => pause += 1,
                    ScrollKind::Think => {}
                }
            }
        }
        assert_eq!(forward, 10_000);
        let back_rate = back as f64 / forward as f64;
        let pause_rate = pause as f64 / forward as f64;
        assert!((0.13..0.17).contains(&back_rate), "back-scroll rate {}", back_rate);
        assert!((0.08..0.12).contains(&pause_rate), "pause rate {}", pause_rate);
    }

    #[test]
    fn test_hover_rate() {
        let mut s = synth(9);
        let hovers = (0..10_000).filter(|_| s.should_hover()).count();
        let rate = hovers as f64 / 10_000.0;
        assert!((0.08..0.12).contains(&rate), "hover rate {}", rate);
    }

    #[test]
    fn test_random_scroll_distance() {
        let mut s = ScrollSynthesizer::seeded(quiet(), TimingProfile::default(), 6).unwrap();
        for _ in 0..100 {
            let steps = s.plan_random_scroll().forward_steps();
            assert!((4..=11).contains(&steps));
        }
    }

    #[test]
    fn test_scroll_to_element() {
        let mut s = ScrollSynthesizer::seeded(quiet(), TimingProfile::default(), 7).unwrap();
        let plan = s.plan_scroll_to(0.0, 1_200.0);
        assert_eq!(plan.steps[0].kind, ScrollKind::Think);
        assert_eq!(plan.forward_steps(), 20);

        let none = s.plan_scroll_to(1_000.0, 900.0);
        assert!(none.is_empty());
    }
}
