//! Pointer motion synthesis
//!
//! Plans a humanlike pointer path between two screen points:
//!
//! 1. A cubic Bézier curve whose two control points sit at 1/3 and 2/3 of the
//!    straight line, pushed sideways along the path normal by up to ±30% of the
//!    path length.
//! 2. One sample per 5 px of distance, never fewer than 10 nor more than 4000.
//! 3. A trapezoidal speed profile: ramp up over the first 30% of samples, cruise
//!    over the middle 40%, slow down over the last 30%.
//! 4. Occasional micro-jitter points, then an overshoot past the target along the
//!    dominant axis and a final correction onto the exact target.
//!
//! The synthesizer only plans; moving a real pointer is done by
//! [`crate::playback::Player`] or the caller.

use crate::error::GovernError;
use crate::timing::symmetric;
use crate::types::{Point, StepKind, Trajectory, TrajectoryStep};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Path length covered by one sample
const PIXELS_PER_SAMPLE: f64 = 5.0;

/// Lower bound on path samples, however short the path
pub const MIN_SAMPLES: usize = 10;

/// Upper bound on path samples; paths beyond 20 000 px get coarser spacing
pub const MAX_SAMPLES: usize = 4_000;

/// Sideways control point offset as a fraction of path length
const CONTROL_SPREAD: f64 = 0.3;

/// Fraction of the path spent accelerating (and, mirrored, decelerating)
const RAMP_FRACTION: f64 = 0.3;

/// Maximum jitter offset on each axis (px)
const JITTER_PX: f64 = 2.0;

const JITTER_HOLD: Duration = Duration::from_millis(50);
const OVERSHOOT_HOLD: Duration = Duration::from_millis(100);

/// Motion tuning, the `mouse` section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Pointer speed bounds in px/s: start speed and cruise speed
    pub speed_range: [f64; 2],
    /// Overshoot distance bounds in px
    pub overshoot_range: [f64; 2],
    /// Chance of a micro-jitter point after each sample
    pub correction_probability: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_range: [100.0, 400.0],
            overshoot_range: [3.0, 8.0],
            correction_probability: 0.1,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<(), GovernError> {
        check_range("mouse.speed_range", self.speed_range)?;
        check_range("mouse.overshoot_range", self.overshoot_range)?;
        if self.speed_range[0] <= 0.0 {
            return Err(GovernError::Config(
                "mouse.speed_range must be strictly positive".to_string(),
            ));
        }
        check_probability("mouse.correction_probability", self.correction_probability)
    }
}

/// Reject `[min, max]` pairs that are inverted, negative or not finite
pub(crate) fn check_range(name: &str, range: [f64; 2]) -> Result<(), GovernError> {
    let [min, max] = range;
    if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
        return Err(GovernError::InvalidRange {
            name: name.to_string(),
            min,
            max,
        });
    }
    Ok(())
}

pub(crate) fn check_probability(name: &str, p: f64) -> Result<(), GovernError> {
    if !(0.0..=1.0).contains(&p) {
        return Err(GovernError::Config(format!(
            "{} must be within [0, 1], got {}",
            name, p
        )));
    }
    Ok(())
}

/// Bézier pointer path planner
pub struct MotionSynthesizer<R: Rng = StdRng> {
    config: MotionConfig,
    rng: R,
}

impl MotionSynthesizer<StdRng> {
    /// Synthesizer with a deterministic random source
    pub fn seeded(config: MotionConfig, seed: u64) -> Result<Self, GovernError> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }

    /// Synthesizer seeded from the operating system
    pub fn from_os_rng(config: MotionConfig) -> Result<Self, GovernError> {
        Self::new(config, StdRng::from_os_rng())
    }
}

impl<R: Rng> MotionSynthesizer<R> {
    pub fn new(config: MotionConfig, rng: R) -> Result<Self, GovernError> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// Plan a trajectory from `start` to `target`
    ///
    /// The first point is exactly `start` and the last is exactly `target`.
    /// A non-finite distance plans the minimum number of samples.
    pub fn plan_motion(&mut self, start: Point, target: Point) -> Trajectory {
        let distance = start.distance_to(target);
        let samples = if distance.is_finite() {
            ((distance / PIXELS_PER_SAMPLE) as usize).clamp(MIN_SAMPLES, MAX_SAMPLES)
        } else {
            MIN_SAMPLES
        };

        let (cp1, cp2) = self.control_points(start, target);
        let mut steps = Vec::with_capacity(samples + samples / 8 + 2);

        for i in 0..samples {
            let t = i as f64 / (samples - 1) as f64;
            let point = if i == 0 {
                start
            } else if i == samples - 1 {
                target
            } else {
                cubic_bezier(start, cp1, cp2, target, t)
            };

            let speed = self.speed_at(i, samples);
            steps.push(TrajectoryStep {
                point,
                hold: Duration::from_secs_f64(PIXELS_PER_SAMPLE / speed),
                kind: StepKind::Path,
            });

            if self.rng.random_bool(self.config.correction_probability) {
                let dx = symmetric(&mut self.rng, JITTER_PX);
                let dy = symmetric(&mut self.rng, JITTER_PX);
                steps.push(TrajectoryStep {
                    point: point.offset(dx, dy),
                    hold: JITTER_HOLD,
                    kind: StepKind::Jitter,
                });
            }
        }

        let overshoot = self.overshoot_point(start, target);
        steps.push(TrajectoryStep {
            point: overshoot,
            hold: OVERSHOOT_HOLD,
            kind: StepKind::Overshoot,
        });
        steps.push(TrajectoryStep {
            point: target,
            hold: Duration::ZERO,
            kind: StepKind::Correction,
        });

        Trajectory { steps }
    }

    /// Control points at 1/3 and 2/3 of the chord, offset along its normal
    fn control_points(&mut self, start: Point, end: Point) -> (Point, Point) {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let length = (dx * dx + dy * dy).sqrt();
        if length == 0.0 {
            return (start, end);
        }

        // Unit normal to the chord
        let nx = -dy / length;
        let ny = dx / length;
        let spread = length * CONTROL_SPREAD;

        let off1 = symmetric(&mut self.rng, spread);
        let off2 = symmetric(&mut self.rng, spread);

        let cp1 = Point::new(start.x + dx / 3.0 + nx * off1, start.y + dy / 3.0 + ny * off1);
        let cp2 = Point::new(
            start.x + 2.0 * dx / 3.0 + nx * off2,
            start.y + 2.0 * dy / 3.0 + ny * off2,
        );
        (cp1, cp2)
    }

    /// Trapezoidal speed in px/s for sample `step` of `total`
    fn speed_at(&self, step: usize, total: usize) -> f64 {
        let [low, high] = self.config.speed_range;
        let progress = step as f64 / total as f64;

        let speed = if progress < RAMP_FRACTION {
            low + (high - low) * progress / RAMP_FRACTION
        } else if progress > 1.0 - RAMP_FRACTION {
            // Ease down to two thirds of the way back from cruise to start speed
            let into = (progress - (1.0 - RAMP_FRACTION)) / RAMP_FRACTION;
            high - (high - low) * (2.0 / 3.0) * into
        } else {
            high
        };
        speed.max(1.0)
    }

    /// Point 3-8 px past the target along the dominant axis of travel
    fn overshoot_point(&mut self, start: Point, target: Point) -> Point {
        let [min, max] = self.config.overshoot_range;
        let amount = if max > min {
            self.rng.random_range(min..max)
        } else {
            min
        };

        let dx = target.x - start.x;
        let dy = target.y - start.y;
        if dy.abs() > dx.abs() {
            target.offset(0.0, amount * dy.signum())
        } else {
            let sign = if dx < 0.0 { -1.0 } else { 1.0 };
            target.offset(amount * sign, 0.0)
        }
    }
}

/// `B(t) = (1-t)³P0 + 3(1-t)²tP1 + 3(1-t)t²P2 + t³P3`
fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let b0 = u * u * u;
    let b1 = 3.0 * u * u * t;
    let b2 = 3.0 * u * t * t;
    let b3 = t * t * t;
    Point::new(
        b0 * p0.x + b1 * p1.x + b2 * p2.x + b3 * p3.x,
        b0 * p0.y + b1 * p1.y + b2 * p2.y + b3 * p3.y,
    )
}
